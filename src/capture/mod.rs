pub(crate) mod command; // Remote command lines with quoted values
pub(crate) mod logic;   // File archive and database dumps on the remote host
pub(crate) mod naming;  // Collision-free snapshot names

pub use logic::{capture_database, capture_files};
pub use naming::resolve_base_name;
