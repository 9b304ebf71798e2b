pub mod deploy;
pub mod util;
