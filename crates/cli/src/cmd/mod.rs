mod audit;
mod fetch;
mod info;
mod ledger;
mod prebuilds;
mod unpack;
mod versions;

pub use audit::cmd_audit;
pub use fetch::cmd_fetch;
pub use info::cmd_info;
pub use ledger::cmd_ledger;
pub use prebuilds::cmd_prebuilds;
pub use unpack::cmd_unpack;
pub use versions::cmd_versions;
