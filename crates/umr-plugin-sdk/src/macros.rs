//! Convenience macros for plugin development.

/// Builds a `PluginMetadata`.
///
/// # Example
/// ```rust,ignore
/// let metadata = plugin_metadata!(
///     id: "my-plugin",
///     name: "My Plugin",
///     version: "1.0.0",
///     description: "Does things"
/// );
/// ```
#[macro_export]
macro_rules! plugin_metadata {
    (
        id: $id:expr,
        name: $name:expr,
        version: $version:expr $(,)?
    ) => {
        $crate::prelude::PluginMetadata::new($id, $name, $version)
    };
    (
        id: $id:expr,
        name: $name:expr,
        version: $version:expr,
        description: $desc:expr $(,)?
    ) => {{
        let mut metadata = $crate::prelude::PluginMetadata::new($id, $name, $version);
        metadata.description = Some($desc.to_string());
        metadata
    }};
}

/// Exports the constructor symbols a dynamically loaded plugin needs.
///
/// The host must be built with the same compiler and `umr-plugin` version.
///
/// # Example
/// ```rust,ignore
/// export_plugin!(MyPlugin::new());
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($constructor:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn umr_plugin_abi_version() -> u32 {
            $crate::__private::ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn umr_create_plugin() -> *mut $crate::__private::PluginHandle {
            let plugin: ::std::sync::Arc<dyn $crate::prelude::Plugin> =
                ::std::sync::Arc::new($constructor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new($crate::__private::PluginHandle(plugin)))
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug)]
    struct Exported;

    #[async_trait]
    impl Plugin for Exported {
        fn metadata(&self) -> PluginMetadata {
            plugin_metadata!(id: "exported", name: "Exported", version: "0.1.0", description: "test")
        }
    }

    export_plugin!(Exported);

    #[test]
    fn test_metadata_macro() {
        let metadata = plugin_metadata!(id: "a", name: "A", version: "1.0.0");
        assert_eq!(metadata.id, "a");
        assert!(metadata.description.is_none());
        assert_eq!(Exported.metadata().description.as_deref(), Some("test"));
    }

    #[test]
    fn test_exported_constructor() {
        assert_eq!(umr_plugin_abi_version(), crate::__private::ABI_VERSION);

        let raw = umr_create_plugin();
        assert!(!raw.is_null());
        // SAFETY: pointer comes straight from Box::into_raw above.
        let handle = unsafe { Box::from_raw(raw) };
        assert_eq!(handle.0.metadata().id, "exported");
    }
}
