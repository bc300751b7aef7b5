use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Profiles {
    Table,
    UserId,
    FullName,
    Phone,
    AvatarUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserRoles {
    Table,
    Id,
    UserId,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserWallets {
    Table,
    UserId,
    BalanceUsd,
    BalancePkr,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    UserId,
    Type,
    AmountUsd,
    AmountPkr,
    Currency,
    PaymentMethod,
    Status,
    ScreenshotUrl,
    Description,
    ReviewedBy,
    ReviewedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PremiumPlans {
    Table,
    Id,
    Name,
    Description,
    PriceUsd,
    PricePkr,
    DurationDays,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserSubscriptions {
    Table,
    Id,
    UserId,
    PlanId,
    Status,
    StartsAt,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    Id,
    Title,
    Description,
    PriceUsd,
    PricePkr,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CourseEnrollments {
    Table,
    Id,
    UserId,
    CourseId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AdminWallet {
    Table,
    Id,
    TotalReceivedUsd,
    TotalReceivedPkr,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

fn timestamp_now<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::cust("NOW()"))
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 用户账号
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string_len(255).not_null())
                    .col(&mut timestamp_now(Users::CreatedAt))
                    .col(&mut timestamp_now(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Profiles::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Profiles::FullName).string_len(100).null())
                    .col(ColumnDef::new(Profiles::Phone).string_len(32).null())
                    .col(ColumnDef::new(Profiles::AvatarUrl).text().null())
                    .col(&mut timestamp_now(Profiles::CreatedAt))
                    .col(&mut timestamp_now(Profiles::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_profiles_user")
                            .from(Profiles::Table, Profiles::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRoles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserRoles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserRoles::UserId).big_integer().not_null())
                    .col(ColumnDef::new(UserRoles::Role).string_len(20).not_null())
                    .col(&mut timestamp_now(UserRoles::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_roles_user")
                            .from(UserRoles::Table, UserRoles::UserId)
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
                    .name("idx_user_roles_user_role_unique")
                    .table(UserRoles::Table)
                    .col(UserRoles::UserId)
                    .col(UserRoles::Role)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 钱包余额不允许为负
        manager
            .create_table(
                Table::create()
                    .table(UserWallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserWallets::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserWallets::BalanceUsd)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(UserWallets::BalanceUsd).gte(0)),
                    )
                    .col(
                        ColumnDef::new(UserWallets::BalancePkr)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(UserWallets::BalancePkr).gte(0)),
                    )
                    .col(&mut timestamp_now(UserWallets::CreatedAt))
                    .col(&mut timestamp_now(UserWallets::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_wallets_user")
                            .from(UserWallets::Table, UserWallets::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Type).string_len(20).not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountUsd)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Transactions::AmountPkr)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Transactions::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Transactions::PaymentMethod).string_len(32).null())
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Transactions::ScreenshotUrl).text().null())
                    .col(ColumnDef::new(Transactions::Description).text().null())
                    .col(ColumnDef::new(Transactions::ReviewedBy).big_integer().null())
                    .col(
                        ColumnDef::new(Transactions::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(&mut timestamp_now(Transactions::CreatedAt))
                    .col(&mut timestamp_now(Transactions::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_user")
                            .from(Transactions::Table, Transactions::UserId)
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
                    .name("idx_transactions_user")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .to_owned(),
            )
            .await?;

        // 管理后台按状态筛选待审核充值
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_type_status")
                    .table(Transactions::Table)
                    .col(Transactions::Type)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PremiumPlans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PremiumPlans::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PremiumPlans::Name)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(PremiumPlans::Description).text().null())
                    .col(ColumnDef::new(PremiumPlans::PriceUsd).big_integer().not_null())
                    .col(ColumnDef::new(PremiumPlans::PricePkr).big_integer().not_null())
                    .col(ColumnDef::new(PremiumPlans::DurationDays).integer().not_null())
                    .col(
                        ColumnDef::new(PremiumPlans::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut timestamp_now(PremiumPlans::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSubscriptions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::PlanId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(&mut timestamp_now(UserSubscriptions::CreatedAt))
                    .col(&mut timestamp_now(UserSubscriptions::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_subscriptions_user")
                            .from(UserSubscriptions::Table, UserSubscriptions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_subscriptions_plan")
                            .from(UserSubscriptions::Table, UserSubscriptions::PlanId)
                            .to(PremiumPlans::Table, PremiumPlans::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_subscriptions_user")
                    .table(UserSubscriptions::Table)
                    .col(UserSubscriptions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Courses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Courses::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Courses::Title)
                            .string_len(200)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Courses::Description).text().null())
                    .col(ColumnDef::new(Courses::PriceUsd).big_integer().not_null())
                    .col(ColumnDef::new(Courses::PricePkr).big_integer().not_null())
                    .col(
                        ColumnDef::new(Courses::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut timestamp_now(Courses::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CourseEnrollments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CourseEnrollments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CourseEnrollments::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseEnrollments::CourseId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseEnrollments::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(&mut timestamp_now(CourseEnrollments::CreatedAt))
                    .col(&mut timestamp_now(CourseEnrollments::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_course_enrollments_user")
                            .from(CourseEnrollments::Table, CourseEnrollments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_course_enrollments_course")
                            .from(CourseEnrollments::Table, CourseEnrollments::CourseId)
                            .to(Courses::Table, Courses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一用户同一课程只能报名一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_course_enrollments_user_course_unique")
                    .table(CourseEnrollments::Table)
                    .col(CourseEnrollments::UserId)
                    .col(CourseEnrollments::CourseId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AdminWallet::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminWallet::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AdminWallet::TotalReceivedUsd)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AdminWallet::TotalReceivedPkr)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(&mut timestamp_now(AdminWallet::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 先删依赖表
        for table in [
            CourseEnrollments::Table.into_iden(),
            Courses::Table.into_iden(),
            UserSubscriptions::Table.into_iden(),
            PremiumPlans::Table.into_iden(),
            Transactions::Table.into_iden(),
            UserWallets::Table.into_iden(),
            UserRoles::Table.into_iden(),
            Profiles::Table.into_iden(),
            AdminWallet::Table.into_iden(),
            Users::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().if_exists().table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}
