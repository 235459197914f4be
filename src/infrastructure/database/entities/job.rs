// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub status: String,
    pub priority: i32,
    pub payload: Json,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_run_at: ChronoDateTimeWithTimeZone,
    pub locked_at: Option<ChronoDateTimeWithTimeZone>,
    pub locked_by: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
