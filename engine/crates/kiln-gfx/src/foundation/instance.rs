use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::debug_messenger::GfxDebugMsger;

pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
    validation: bool,
}

// 创建与销毁
impl GfxInstance {
    /// # param
    /// * `platform_exts` - 平台创建 surface 所需的 instance extensions
    /// * `validation` - 是否开启 validation layer 以及 debug utils
    pub fn new(
        entry: &ash::Entry,
        app_name: &str,
        platform_exts: &[*const c_char],
        validation: bool,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(app_name).map_err(|e| GfxError::Config(e.to_string()))?;
        let engine_name = c"kiln";
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let validation = validation && Self::validation_layer_available(entry);
        if !validation {
            log::info!("validation layer disabled");
        }

        let mut exts = platform_exts.to_vec();
        if validation {
            exts.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        let layers = if validation { vec![Self::VALIDATION_LAYER.as_ptr()] } else { vec![] };

        log::info!(
            "instance exts: {}",
            exts.iter().map(|e| unsafe { CStr::from_ptr(*e) }.to_string_lossy()).join(", ")
        );

        let mut debug_ci = GfxDebugMsger::messenger_ci();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&exts)
            .enabled_layer_names(&layers);
        if validation {
            create_info = create_info.push_next(&mut debug_ci);
        }

        let ash_instance = unsafe { entry.create_instance(&create_info, None).vk_context("vkCreateInstance")? };
        Ok(Self {
            ash_instance,
            validation,
        })
    }

    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    const VALIDATION_LAYER: &'static CStr = c"VK_LAYER_KHRONOS_validation";

    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == Self::VALIDATION_LAYER));
        if !found {
            log::warn!("validation layer requested but {:?} is not installed", Self::VALIDATION_LAYER);
        }
        found
    }
}
