use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 初始套餐与课程目录（金额单位：美分 / 派萨）
/// 管理员汇总钱包固定 id = 1
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        let backend = manager.get_database_backend();

        let plans_sql = r#"
INSERT INTO premium_plans (name, description, price_usd, price_pkr, duration_days, is_active)
VALUES
 ('ChatGPT Plus Shared', 'Shared ChatGPT Plus seat', 800, 220000, 30, TRUE),
 ('ChatGPT Plus Private', 'Private ChatGPT Plus account', 2200, 600000, 30, TRUE),
 ('Canva Pro', 'Canva Pro team invite', 300, 80000, 30, TRUE),
 ('AI Tools Bundle', 'ChatGPT, Canva, Grammarly and CapCut bundle', 1500, 420000, 30, TRUE)
ON CONFLICT (name) DO NOTHING;
"#;
        conn.execute(Statement::from_string(backend, plans_sql.to_string()))
            .await?;

        let courses_sql = r#"
INSERT INTO courses (title, description, price_usd, price_pkr, is_active)
VALUES
 ('YouTube Automation Masterclass', 'Faceless channel setup, niche research and monetization', 4900, 1350000, TRUE),
 ('Full-Stack Web Development', 'Modern web apps from landing page to deployment', 9900, 2750000, TRUE),
 ('AI Tools for Freelancers', 'Prompting, content and design workflows with AI tools', 2900, 800000, TRUE)
ON CONFLICT (title) DO NOTHING;
"#;
        conn.execute(Statement::from_string(backend, courses_sql.to_string()))
            .await?;

        conn.execute(Statement::from_string(
            backend,
            "INSERT INTO admin_wallet (id, total_received_usd, total_received_pkr) VALUES (1, 0, 0) ON CONFLICT (id) DO NOTHING;"
                .to_string(),
        ))
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared("DELETE FROM admin_wallet WHERE id = 1")
            .await?;
        Ok(())
    }
}
