mod access;
mod anchor;
pub mod dates;
mod object_id;
mod reference;
mod walker;

pub use access::{Access, AccessLevel, RootAccess};
pub use anchor::{Anchor, Links};
pub use object_id::{ObjectId, PUBLIC_ROOT_ID, SUPER_ROOT_ID};
pub use reference::{AnchorKind, Reference, ReferenceError};
pub use walker::{Schedule, ScheduleStatus, WalkerRecord};
