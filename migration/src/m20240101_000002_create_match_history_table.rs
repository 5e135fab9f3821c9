use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MatchHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MatchHistory::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MatchHistory::PlayerId).string().not_null())
                    .col(ColumnDef::new(MatchHistory::SessionId).string().not_null())
                    .col(ColumnDef::new(MatchHistory::LobbyId).string().not_null())
                    .col(ColumnDef::new(MatchHistory::GameType).string().not_null())
                    .col(ColumnDef::new(MatchHistory::State).string().not_null())
                    .col(ColumnDef::new(MatchHistory::Score).integer().not_null())
                    .col(ColumnDef::new(MatchHistory::EntryJson).text().not_null())
                    .col(
                        ColumnDef::new(MatchHistory::FinishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One entry per player per session keeps commits idempotent
        manager
            .create_index(
                Index::create()
                    .name("idx_match_history_player_session")
                    .table(MatchHistory::Table)
                    .col(MatchHistory::PlayerId)
                    .col(MatchHistory::SessionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create index on finished_at for recent-history queries
        manager
            .create_index(
                Index::create()
                    .name("idx_match_history_finished_at")
                    .table(MatchHistory::Table)
                    .col(MatchHistory::FinishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MatchHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MatchHistory {
    Table,
    Id,
    PlayerId,
    SessionId,
    LobbyId,
    GameType,
    State,
    Score,
    EntryJson,
    FinishedAt,
}
