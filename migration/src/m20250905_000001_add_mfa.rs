use sea_orm_migration::prelude::*;

/// TOTP 因子
#[derive(DeriveIden)]
enum MfaFactors {
    Table,
    Id,
    UserId,
    FactorType,
    FriendlyName,
    Secret,
    Status,
    CreatedAt,
    UpdatedAt,
}

/// 验证挑战（5 分钟有效）
#[derive(DeriveIden)]
enum MfaChallenges {
    Table,
    Id,
    FactorId,
    CreatedAt,
    ExpiresAt,
    VerifiedAt,
    FailedAttempts,
}

/// 管理员 2FA 状态与失败计数
#[derive(DeriveIden)]
enum AdminSecurity {
    Table,
    UserId,
    MfaEnrolled,
    FailedAttempts,
    LockedUntil,
    LastFailedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MfaFactors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MfaFactors::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(MfaFactors::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(MfaFactors::FactorType)
                            .string_len(20)
                            .not_null()
                            .default("totp"),
                    )
                    .col(ColumnDef::new(MfaFactors::FriendlyName).string_len(100).null())
                    .col(ColumnDef::new(MfaFactors::Secret).string_len(64).not_null())
                    .col(
                        ColumnDef::new(MfaFactors::Status)
                            .string_len(20)
                            .not_null()
                            .default("unverified"),
                    )
                    .col(
                        ColumnDef::new(MfaFactors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(MfaFactors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mfa_factors_user")
                            .from(MfaFactors::Table, MfaFactors::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_mfa_factors_user")
                    .table(MfaFactors::Table)
                    .col(MfaFactors::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MfaChallenges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MfaChallenges::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MfaChallenges::FactorId).uuid().not_null())
                    .col(
                        ColumnDef::new(MfaChallenges::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(MfaChallenges::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MfaChallenges::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MfaChallenges::FailedAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mfa_challenges_factor")
                            .from(MfaChallenges::Table, MfaChallenges::FactorId)
                            .to(MfaFactors::Table, MfaFactors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AdminSecurity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminSecurity::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AdminSecurity::MfaEnrolled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AdminSecurity::FailedAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AdminSecurity::LockedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdminSecurity::LastFailedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdminSecurity::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_admin_security_user")
                            .from(AdminSecurity::Table, AdminSecurity::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(MfaChallenges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(MfaFactors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(AdminSecurity::Table).to_owned())
            .await?;
        Ok(())
    }
}
