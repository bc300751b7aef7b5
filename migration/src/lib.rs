pub use sea_orm_migration::prelude::*;

mod m20250901_000001_initial;
mod m20250901_000002_seed_catalog;
mod m20250905_000001_add_mfa;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_initial::Migration),
            Box::new(m20250901_000002_seed_catalog::Migration),
            Box::new(m20250905_000001_add_mfa::Migration),
        ]
    }
}
