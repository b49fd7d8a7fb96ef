/// An error that can occur when registering a [`crate::Monitor`] with a
/// [`crate::Coordinator`]
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The monitor's identifier was empty, so it can't be deduplicated
    #[error("the monitor does not have an identifier")]
    MissingIdentifier,
    /// A monitor with the same identifier is already registered
    #[error("a monitor with the identifier '{id}' is already registered")]
    DuplicateMonitor { id: String },
}
