use uuid::Uuid;

use dispatch_core::InstanceId;

const NAME_PREFIX: &str = "inst";

/// Generate a short unique instance name: a stable prefix plus 2 bytes of
/// entropy hex (spec §4.5.2). Collisions are the caller's (`StartInstance`'s)
/// responsibility to reject, not this function's.
pub fn generate_instance_id() -> InstanceId {
    let bytes = Uuid::new_v4().into_bytes();
    let suffix = hex::encode(&bytes[0..2]);
    InstanceId::from(format!("{NAME_PREFIX}-{suffix}"))
}
