//! 外部依存を持たない（トレイト経由でのみ触れる）ビジネスロジック

pub mod rate_limit;
