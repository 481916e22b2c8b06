mod binding;
mod list;
mod record;

pub use binding::{ProxyBinding, Registry, ShadowEntity};
pub use list::ProxyList;
pub use record::{DeleteOutcome, Record, Refresh, WriteKind, WriteOutcome, DATETIME_FORMAT};
