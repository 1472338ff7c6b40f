#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use edgehub_filter_core as core;
pub use edgehub_k8s_api as k8s;
pub use edgehub_k8s_filters as filters;
pub use edgehub_multiplexer as mux;

mod args;
mod proxy;
mod request_info;


pub use self::{
    args::{Args, DEFAULT_ENDPOINT_FILTER_PREDICATE},
    proxy::{serve, Proxy},
};
