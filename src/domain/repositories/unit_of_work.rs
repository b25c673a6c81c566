/// Runs store calls against one connection handle, either inside a single atomic
/// transaction or as plain auto-committed statements.
///
/// Every repository method takes the handle explicitly, so the same store serves
/// both modes and a transactional handle can never outlive its closure.
pub trait UnitOfWork: Send + Sync + 'static {
    type Conn: Send;

    /// Runs `f` on a non-transactional connection.
    fn connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Conn) -> Result<T, E>,
        E: From<anyhow::Error>;

    /// Runs `f` inside one transaction. Commits when `f` returns `Ok`; rolls back
    /// and returns the error unchanged otherwise. A panic inside `f` never commits.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Conn) -> Result<T, E>,
        E: From<anyhow::Error>;
}
