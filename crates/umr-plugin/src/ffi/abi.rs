//! Symbols a dynamic plugin library must export.
//!
//! The plugin object crosses the boundary as a boxed Rust trait object, so
//! host and plugin must be built by the same compiler against the same
//! `umr-plugin` version. The ABI version symbol catches the second case.

use std::sync::Arc;

use crate::plugin::Plugin;

/// Bumped whenever [`Plugin`] or [`PluginHandle`] change shape.
pub const ABI_VERSION: u32 = 1;

/// Name of the ABI version symbol.
pub const ABI_VERSION_SYMBOL: &[u8] = b"umr_plugin_abi_version\0";

/// Name of the constructor symbol.
pub const CREATE_SYMBOL: &[u8] = b"umr_create_plugin\0";

/// Owned plugin instance handed from the library to the host.
pub struct PluginHandle(pub Arc<dyn Plugin>);

/// `extern "C" fn umr_plugin_abi_version() -> u32`
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// `extern "C" fn umr_create_plugin() -> *mut PluginHandle`
///
/// The returned pointer comes from `Box::into_raw` and is owned by the host.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut PluginHandle;
