/// Describes where feature evaluation happens. Fixed for the lifetime of a [`crate::Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    /// No network traffic at all; only locally resolved features are returned.
    Offline,
    /// Feature definitions are downloaded periodically and evaluated in-process.
    #[default]
    LocalEvaluation,
    /// Every feature request is evaluated by the backend.
    RemoteEvaluation,
}
