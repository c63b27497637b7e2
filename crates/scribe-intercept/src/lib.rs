pub mod interceptor;

pub use interceptor::{Interceptor, PageFrame};
