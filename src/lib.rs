pub mod sync {
    pub mod scope;
    pub mod slot;
    pub mod store;
}

pub mod stress;
