// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod memory_repository;

use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;

/// 基于临时文件的SQLite测试数据库
///
/// 返回连接和guard；guard负责在测试结束后清理临时目录
pub async fn create_test_db() -> (Arc<DatabaseConnection>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("portalq_test.sqlite");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());

    let db = Database::connect(&url).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");

    (Arc::new(db), dir)
}
