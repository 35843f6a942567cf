use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// 将 validation layer 的消息转发到 `log`
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMsger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&Self::messenger_ci(), None)
                .vk_context("vkCreateDebugUtilsMessengerEXT")?
        };

        Ok(Self { loader, messenger })
    }

    /// 创建 instance 时也会用到，用来捕获 vkCreateInstance 期间的消息
    pub fn messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

impl Drop for GfxDebugMsger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// 将 layer 给出的消息整理成易读的格式
///
/// 部分 layer 会输出 json，其中 `MainMessage` 字段带有换行，需要单独输出
fn format_layer_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let json_obj = json_value.as_mut().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default();
            let rest = serde_json::to_string_pretty(obj).unwrap_or_default();
            format!("[{message_type:?}]\n{rest}\n{main_msg}")
        }
        None => format!("[{message_type:?}] {msg}"),
    }
}

unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let msg = if p_callback_data.is_null() || unsafe { (*p_callback_data).p_message.is_null() } {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr((*p_callback_data).p_message).to_string_lossy() }
    };

    let format_msg = format_layer_message(message_type, &msg);
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{format_msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{format_msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("{format_msg}"),
        _ => log::debug!("{format_msg}"),
    }

    // 只有 layer 开发者才需要返回 TRUE
    vk::FALSE
}

/// 用于给 Vulkan 对象设置 debug name
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain_message() {
        let msg = format_layer_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "image layout mismatch");
        assert!(msg.ends_with("image layout mismatch"));
        assert!(msg.starts_with("[VALIDATION]"));
    }

    #[test]
    fn test_format_json_message() {
        let raw = r#"{"MainMessage": "line1\nline2", "MessageID": 42}"#;
        let msg = format_layer_message(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, raw);
        assert!(msg.ends_with("line1\nline2"));
        assert!(msg.contains("\"MessageID\": 42"));
        assert!(!msg.contains("MainMessage"));
    }
}
