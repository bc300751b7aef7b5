//! 后台定时任务
//!
//! 启动时调用一次 `spawn_all`，各任务在自己的循环里运行。

use crate::services::{CatalogService, MfaService};

const HOURLY: std::time::Duration = std::time::Duration::from_secs(3600);

/// 通过 `tokio::spawn` 分离运行，不阻塞调用方
pub fn spawn_all(catalog_service: CatalogService, mfa_service: MfaService) {
    // 订阅过期检查（每小时）
    {
        let svc = catalog_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.expire_subscriptions().await {
                    Ok(n) if n > 0 => log::info!("Expired subscriptions processed: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire subscriptions: {e:?}"),
                }
                tokio::time::sleep(HOURLY).await;
            }
        });
    }

    // 清理已使用或过期的 MFA 挑战（每小时）
    {
        let svc = mfa_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.purge_stale_challenges().await {
                    Ok(n) if n > 0 => log::debug!("Stale MFA challenges purged: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to purge MFA challenges: {e:?}"),
                }
                tokio::time::sleep(HOURLY).await;
            }
        });
    }
}
