use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 平台收款汇总，仅一行 (id = 1)，充值审核通过时累加
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "admin_wallet")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub total_received_usd: i64,
    pub total_received_pkr: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

pub const SINGLETON_ID: i64 = 1;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
