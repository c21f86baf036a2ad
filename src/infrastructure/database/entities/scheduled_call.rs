// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scheduled_calls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub serialized_call_request: String,
    pub schedule: String,
    pub tags: Json,
    pub first_run: ChronoDateTimeWithTimeZone,
    pub last_run: Option<ChronoDateTimeWithTimeZone>,
    pub next_run: Option<ChronoDateTimeWithTimeZone>,
    pub remaining_runs: Option<i32>,
    pub failure_threshold: Option<i32>,
    pub consecutive_failures: i32,
    pub enabled: bool,
    pub call_count: i32,
    pub call_exit_states: Json,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
