pub mod config;
pub mod error;
pub mod events;
pub mod geocode;
pub mod meta;
pub mod scan;
pub mod select;
pub mod processing {
    pub mod layout;
}
pub mod render {
    pub mod compositor;
    pub mod loader;
    pub mod overlay;
}
pub mod tasks {
    pub mod files;
    pub mod viewer;
}
