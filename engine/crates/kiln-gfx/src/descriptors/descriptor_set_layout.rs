use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// 创建与销毁
impl GfxDescriptorSetLayout {
    pub fn new(device: Rc<GfxDevice>, bindings: &[vk::DescriptorSetLayoutBinding], debug_name: &str) -> Self {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let handle =
            unsafe { device.create_descriptor_set_layout(&create_info, None).or_fatal("vkCreateDescriptorSetLayout") };

        let layout = Self { handle, device };
        layout.device.set_debug_name(&layout, debug_name);
        layout
    }

    /// binding 0：一个 dynamic uniform buffer
    pub fn new_dynamic_uniform(device: Rc<GfxDevice>, stages: vk::ShaderStageFlags, debug_name: &str) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(1)
            .stage_flags(stages);
        Self::new(device, std::slice::from_ref(&binding), debug_name)
    }

    /// binding 0..count：combined image sampler，fragment shader 可见
    pub fn new_textures(device: Rc<GfxDevice>, count: u32, debug_name: &str) -> Self {
        let bindings = (0..count)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            })
            .collect_vec();
        Self::new(device, &bindings, debug_name)
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

// tools
impl GfxDevice {
    pub fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> vk::DescriptorSet {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&layouts);
        let sets = unsafe { self.allocate_descriptor_sets(&info).or_fatal("vkAllocateDescriptorSets") };
        sets[0]
    }

    /// 写入 binding 0 的 dynamic uniform buffer，`range` 是每次绑定可见的大小
    pub fn write_dynamic_uniform(&self, set: vk::DescriptorSet, buffer: vk::Buffer, range: vk::DeviceSize) {
        let buffer_info = [vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&buffer_info);
        unsafe {
            self.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
    }

    /// 依次写入 binding 0..n 的 combined image sampler
    pub fn write_textures(&self, set: vk::DescriptorSet, textures: &[(vk::ImageView, vk::Sampler)]) {
        let image_infos = textures
            .iter()
            .map(|(view, sampler)| {
                [vk::DescriptorImageInfo::default()
                    .image_view(*view)
                    .sampler(*sampler)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)]
            })
            .collect_vec();
        let writes = image_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info)
            })
            .collect_vec();
        unsafe {
            self.update_descriptor_sets(&writes, &[]);
        }
    }
}
