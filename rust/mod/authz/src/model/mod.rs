mod batch;
mod catalog;
mod check;
mod domain;
mod grant;
mod role;
mod values;

pub use batch::*;
pub use catalog::*;
pub use check::*;
pub use domain::*;
pub use grant::*;
pub use role::*;
pub use values::*;
