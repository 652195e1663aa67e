/// A message type routed to saga instances.
///
/// Messages are:
/// - **immutable** facts or requests delivered by the transport
/// - identified by a **stable type name** used to pick the policy
///
/// Transport metadata (headers, delivery counts) stays with the transport.
pub trait SagaMessage: core::fmt::Debug + Send + Sync + 'static {
    /// Stable message type identifier (e.g. "order.submitted").
    fn message_type() -> &'static str;
}
