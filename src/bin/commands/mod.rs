pub mod inspect_cmd;
pub mod query_cmd;
pub mod random_cmd;

pub use inspect_cmd::cmd_inspect;
pub use query_cmd::cmd_query;
pub use random_cmd::cmd_random;
