// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "call_reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub task_id: Uuid,
    pub call_request_id: Uuid,
    pub group_id: Option<Uuid>,
    pub task_type: String,
    pub state: String,
    pub response: String,
    pub result: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub blocking_tasks: Json,
    pub reasons: Json,
    pub tags: Json,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub start_time: Option<ChronoDateTimeWithTimeZone>,
    pub finish_time: Option<ChronoDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
