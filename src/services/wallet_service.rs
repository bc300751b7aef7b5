use crate::config::ContactConfig;
use crate::entities::{
    Currency, TransactionStatus, TransactionType, transaction_entity as transactions,
    user_wallet_entity as wallets,
};
use crate::error::{AppError, AppResult};
use crate::external::ObjectStorageService;
use crate::models::*;
use crate::utils::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

/// 确保钱包行存在（老用户可能没有）
pub async fn ensure_wallet<C: ConnectionTrait>(db: &C, user_id: i64) -> Result<wallets::Model, DbErr> {
    if let Some(w) = wallets::Entity::find_by_id(user_id).one(db).await? {
        return Ok(w);
    }
    let now = Utc::now();
    wallets::ActiveModel {
        user_id: Set(user_id),
        balance_usd: Set(0),
        balance_pkr: Set(0),
        created_at: Set(Some(now)),
        updated_at: Set(Some(now)),
    }
    .insert(db)
    .await
}

#[derive(Clone)]
pub struct WalletService {
    pool: Arc<DatabaseConnection>,
    storage: ObjectStorageService,
    contact: ContactConfig,
}

impl WalletService {
    pub fn new(pool: Arc<DatabaseConnection>, storage: ObjectStorageService, contact: ContactConfig) -> Self {
        Self {
            pool,
            storage,
            contact,
        }
    }

    pub async fn get_wallet(&self, user_id: i64) -> AppResult<WalletResponse> {
        Ok(wallets::Entity::find_by_id(user_id)
            .one(self.pool.as_ref())
            .await?
            .map(WalletResponse::from)
            .unwrap_or_else(WalletResponse::empty))
    }

    /// 提交充值申请
    ///
    /// 校验顺序：金额 → 支付方式 → 截图。截图先上传，上传失败则不创建记录；
    /// 记录插入失败时已上传的截图保留在存储中。
    pub async fn submit_deposit(
        &self,
        user_id: i64,
        request: SubmitDepositRequest,
    ) -> AppResult<DepositSubmittedResponse> {
        let amount = amount_to_minor_units(request.amount)?;
        let method = require_payment_method(request.payment_method)?;
        require_method_currency(method, request.currency)?;
        let proof = match &request.proof {
            Some(p) => Some((
                decode_proof(&p.content_type, &p.data_base64)?,
                proof_file_extension(&p.file_name, &p.content_type),
                p.content_type.clone(),
            )),
            None => None,
        };

        let screenshot_url = match proof {
            Some((bytes, ext, content_type)) => {
                let key = format!("{}/{}.{}", user_id, Utc::now().timestamp_millis(), ext);
                let key = self.storage.upload(&key, bytes, &content_type).await?;
                Some(self.storage.public_url(&key))
            }
            None => None,
        };

        let (amount_usd, amount_pkr) = match request.currency {
            Currency::Usd => (amount, 0),
            Currency::Pkr => (0, amount),
        };
        let now = Utc::now();

        let inserted = transactions::ActiveModel {
            user_id: Set(user_id),
            tx_type: Set(TransactionType::Deposit),
            amount_usd: Set(amount_usd),
            amount_pkr: Set(amount_pkr),
            currency: Set(request.currency),
            payment_method: Set(Some(method)),
            status: Set(TransactionStatus::Pending),
            screenshot_url: Set(screenshot_url.clone()),
            description: Set(request.description.filter(|d| !d.trim().is_empty())),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(self.pool.as_ref())
        .await;

        let tx = match inserted {
            Ok(tx) => tx,
            Err(e) => {
                if let Some(url) = &screenshot_url {
                    log::error!("Deposit insert failed after proof upload, orphaned object: {url}");
                }
                return Err(e.into());
            }
        };

        log::info!(
            "Deposit submitted: id={} user={} {} {} via {}",
            tx.id,
            user_id,
            amount,
            request.currency,
            method
        );

        let whatsapp_link = whatsapp_link(
            &self.contact.whatsapp_number,
            &deposit_message(tx.id, amount, request.currency, method),
        );

        Ok(DepositSubmittedResponse {
            transaction: tx.into(),
            whatsapp_link,
        })
    }

    pub async fn list_transactions(
        &self,
        user_id: i64,
        query: &TransactionQuery,
    ) -> AppResult<PaginatedResponse<TransactionResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut base = transactions::Entity::find().filter(transactions::Column::UserId.eq(user_id));
        if let Some(t) = query.tx_type {
            base = base.filter(transactions::Column::TxType.eq(t));
        }
        if let Some(s) = query.status {
            base = base.filter(transactions::Column::Status.eq(s));
        }

        let total = base.clone().count(self.pool.as_ref()).await? as i64;
        let items = base
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(TransactionResponse::from)
            .collect();

        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub fn payment_methods(&self) -> Vec<PaymentMethodInfo> {
        PAYMENT_METHODS
            .into_iter()
            .map(|id| PaymentMethodInfo {
                id,
                name: id.to_string(),
                currencies: supported_currencies(id).to_vec(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::entities::PaymentMethod;
    use sea_orm::{DatabaseBackend, MockDatabase};

    // 存储地址不可达：任何上传都会失败
    fn service(db: DatabaseConnection) -> WalletService {
        WalletService::new(
            Arc::new(db),
            ObjectStorageService::new(StorageConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                service_key: "k".to_string(),
                bucket: "payment-proofs".to_string(),
                signed_url_expires_in: 600,
            }),
            ContactConfig {
                whatsapp_number: "923001234567".to_string(),
            },
        )
    }

    fn request(amount: f64, method: Option<PaymentMethod>) -> SubmitDepositRequest {
        SubmitDepositRequest {
            amount,
            currency: Currency::Pkr,
            payment_method: method,
            proof: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        for amount in [0.0, -10.0] {
            let err = svc
                .submit_deposit(1, request(amount, Some(PaymentMethod::JazzCash)))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
        }
    }

    #[tokio::test]
    async fn test_missing_method_rejected_before_proof() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let mut req = request(100.0, None);
        // 截图本身也不合法，但应先报支付方式错误
        req.proof = Some(DepositProof {
            file_name: "a.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data_base64: "AAAA".to_string(),
        });
        let err = svc.submit_deposit(1, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("payment method")));
    }

    #[tokio::test]
    async fn test_oversized_proof_is_not_uploaded() {
        use base64::Engine as _;
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let mut req = request(100.0, Some(PaymentMethod::EasyPaisa));
        req.proof = Some(DepositProof {
            file_name: "big.png".to_string(),
            content_type: "image/png".to_string(),
            data_base64: base64::engine::general_purpose::STANDARD
                .encode(vec![0u8; MAX_PROOF_BYTES + 1]),
        });
        // 上传会因连接失败返回 ExternalApi/Reqwest 错误，这里必须是校验错误
        let err = svc.submit_deposit(1, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("5MB")));
    }

    #[tokio::test]
    async fn test_submit_deposit_without_proof_creates_pending_row() {
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![transactions::Model {
                id: 41,
                user_id: 7,
                tx_type: TransactionType::Deposit,
                amount_usd: 0,
                amount_pkr: 250050,
                currency: Currency::Pkr,
                payment_method: Some(PaymentMethod::JazzCash),
                status: TransactionStatus::Pending,
                screenshot_url: None,
                description: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Some(now),
                updated_at: Some(now),
            }]])
            .into_connection();
        let svc = service(db);

        let resp = svc
            .submit_deposit(7, request(2500.5, Some(PaymentMethod::JazzCash)))
            .await
            .unwrap();
        assert_eq!(resp.transaction.status, TransactionStatus::Pending);
        assert_eq!(resp.transaction.amount_pkr, 250050);
        assert!(resp.whatsapp_link.starts_with("https://wa.me/923001234567?text="));
        assert!(resp.whatsapp_link.contains("%2341"));
    }

    #[tokio::test]
    async fn test_currency_outside_method_is_rejected_before_insert() {
        // 不追加任何查询结果：若走到插入会得到数据库错误
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let methods = svc.payment_methods();
        let jazzcash = methods
            .iter()
            .find(|m| m.id == PaymentMethod::JazzCash)
            .unwrap();
        assert_eq!(jazzcash.currencies, vec![Currency::Pkr]);

        let mut req = request(50.0, Some(PaymentMethod::JazzCash));
        req.currency = Currency::Usd;
        let err = svc.submit_deposit(7, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("USD")));
    }

    #[test]
    fn test_payment_methods_cover_all_variants() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let methods = svc.payment_methods();
        assert_eq!(methods.len(), 5);
        assert_eq!(methods[0].name, "JazzCash");
    }
}
