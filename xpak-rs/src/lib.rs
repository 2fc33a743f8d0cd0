//! # xpak-rs
//!
//! `xpak-rs` is a pure Rust package cache for the content-addressed archives
//! shipped by Call of Duty titles. It indexes every package of a title by
//! 64-bit content key and extracts objects on demand.
//!
//! ## Features
//! - XPAK, VG-XPAK, XSUB, IPAK and XPTOC package indexes
//! - Raw, LZ4 and Oodle block decompression
//! - Packages stored in a plain directory or inside a CASC storage (TVFS root, BLTE frames)
//! - Concurrent extraction over a bounded pool of file handles
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! xpak-rs = "0.1"
//! ```
//!
//! ### Example: Extracting an object
//! ```no_run
//! use xpak_rs::archive_profile::{ArchiveFormat, ArchiveProfile};
//! use xpak_rs::package_cache::PackageCache;
//!
//! let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xsub));
//! cache.load("path/to/game").unwrap();
//!
//! let key = PackageCache::hash_package_id("some/asset");
//! match cache.extract(key, None).unwrap() {
//!     Some((bytes, size)) => println!("{key}: {size} bytes ({})", bytes.len()),
//!     None => println!("{key} is not in any package"),
//! }
//! ```
//!
//! ### Example: Reading a CASC storage
//! ```no_run
//! use std::io::Read;
//! use xpak_rs::casc_storage::CascStorage;
//!
//! let storage = CascStorage::open("path/to/casc/storage").unwrap();
//! for file_info in storage.files() {
//!     println!("File: {} ({} bytes)", file_info.file_name(), file_info.file_size());
//! }
//!
//! let mut file = storage.open_file("some/file/in/storage.txt").unwrap();
//! let mut contents = Vec::new();
//! file.read_to_end(&mut contents).unwrap();
//! ```

pub mod archive_profile;
pub mod archive_source;
mod block_table;
pub mod block_decompressor;
pub mod block_header;
pub mod casc_build_info;
pub mod casc_config;
pub mod casc_file;
mod casc_file_frame;
pub mod casc_file_info;
mod casc_file_span;
pub mod casc_key_mapping_table;
mod casc_span_header;
pub mod casc_storage;
pub mod chunk_stream_reader;
pub mod chunked_object_reader;
pub mod content_key;
pub mod encoding_key;
pub mod entry;
pub mod error;
mod ext;
pub mod handle_pool;
pub mod loaders;
pub mod package_cache;
pub mod package_cache_object;
pub mod path_table_node_flags;
pub mod span_info;
pub mod tvfs_root_handler;
mod utility;
pub mod xsub_object_reader;

pub use archive_profile::{ArchiveFormat, ArchiveProfile, ProfileQuirks};
pub use content_key::ContentKey;
pub use error::XpakError;
pub use package_cache::{PackageCache, PackageCacheOptions};
pub use package_cache_object::PackageCacheObject;
