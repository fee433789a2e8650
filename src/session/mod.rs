pub mod controller;
pub mod evaluate;
pub mod policy;
pub mod pool;
