//! Database connection and initialization.

pub use alarmd_core::db::DatabaseError;

alarmd_core::define_database!(EventDatabase, "Event database migrations complete");

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = EventDatabase::open_in_memory().await;
        assert!(db.is_ok());
    }
}
