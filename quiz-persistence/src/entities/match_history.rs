use sea_orm::entity::prelude::*;

/// One finished session as seen by one player. The full entry is kept as
/// JSON; the scalar columns exist for filtering and ordering.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "match_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub player_id: String,
    pub session_id: String,
    pub lobby_id: String,
    pub game_type: String,
    pub state: String,
    pub score: i32,
    #[sea_orm(column_type = "Text")]
    pub entry_json: String,
    pub finished_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
