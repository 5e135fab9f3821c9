use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LeaderboardStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LeaderboardStats::PlayerId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LeaderboardStats::Format).string().not_null())
                    .col(ColumnDef::new(LeaderboardStats::Mode).string().not_null())
                    .col(
                        ColumnDef::new(LeaderboardStats::Category)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LeaderboardStats::Correct)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LeaderboardStats::Total)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LeaderboardStats::Score)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LeaderboardStats::WonMatches)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LeaderboardStats::TotalMatches)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(LeaderboardStats::PlayerId)
                            .col(LeaderboardStats::Format)
                            .col(LeaderboardStats::Mode)
                            .col(LeaderboardStats::Category),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on score for per-level leaderboard queries
        manager
            .create_index(
                Index::create()
                    .name("idx_leaderboard_stats_level_score")
                    .table(LeaderboardStats::Table)
                    .col(LeaderboardStats::Format)
                    .col(LeaderboardStats::Mode)
                    .col(LeaderboardStats::Category)
                    .col(LeaderboardStats::Score)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LeaderboardStats::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LeaderboardStats {
    Table,
    PlayerId,
    Format,
    Mode,
    Category,
    Correct,
    Total,
    Score,
    WonMatches,
    TotalMatches,
}
