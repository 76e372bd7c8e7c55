pub mod cli;
pub mod error;

pub mod commands {
    pub mod check;
    pub mod run;
}

pub mod core {
    pub mod comparator;
    pub mod config;
    pub mod criteria;
    pub mod grouping;
    pub mod partitioner;
    pub mod rollup;
    pub mod schema;
    pub mod serialization_info;
    pub mod tuple;
    pub mod value;
}

pub mod io {
    pub mod codec;
    pub mod intermediate;
    pub mod registry;
    pub mod tsv;
    pub mod varint;
}

pub mod utils {
    pub mod util;
}

pub mod constants;

pub use constants::*;
