pub mod blob;
pub mod blob_extractor;
pub mod control_emitter;
pub mod modulator;
pub mod tracker;
