use std::rc::Rc;

use ash::vk;
use crossbeam_channel::Sender;
use kiln_gfx::foundation::device::GfxDevice;
use kiln_gfx::foundation::mem_allocator::GfxMemAllocator;
use kiln_gfx::resources::buffer::GfxBuffer;
use kiln_gfx::resources::deferred::Deferred;
use kiln_render_interface::pipeline_desc::BufferUsage;
use kiln_render_interface::pipeline_settings::FrameResourceSettings;

use crate::frame::frame_resources::FrameResources;
use crate::frame::retirement::{DeferredBuffer, RetiredObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFlag {
    #[default]
    None,
    /// 调用者保证同一帧内多次更新的区间互不重叠
    NonOverlappingUpdatesPromise,
}

/// 同一帧内对同一个 buffer 的多次上传会互相覆盖，只有调用者承诺区间不重叠时才允许
#[derive(Debug, Default)]
struct UploadTracker {
    last_frame: Option<u64>,
}

impl UploadTracker {
    /// # return
    /// 本次上传是否合法
    fn record(&mut self, frame_num: u64, flag: UpdateFlag) -> bool {
        let ok = flag == UpdateFlag::NonOverlappingUpdatesPromise || self.last_frame != Some(frame_num);
        self.last_frame = Some(frame_num);
        ok
    }
}

/// 上层可见的顶点或者索引 buffer
///
/// 数据先写入当前帧的 staging 块，再在 copy 命令中拷贝到设备内存。
/// 重新分配时旧对象通过回收通道延迟销毁。
pub struct BackendBuffer {
    usage: BufferUsage,
    object: Option<DeferredBuffer>,
    tracker: UploadTracker,

    name: String,
    retired: Sender<RetiredObject>,
    allocator: Rc<GfxMemAllocator>,
    device: Rc<GfxDevice>,
}

// new & init
impl BackendBuffer {
    /// 创建时不分配任何设备内存，大小为 0
    pub fn new(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        retired: Sender<RetiredObject>,
        usage: BufferUsage,
        name: impl Into<String>,
    ) -> Self {
        Self {
            usage,
            object: None,
            tracker: UploadTracker::default(),
            name: name.into(),
            retired,
            allocator,
            device,
        }
    }
}

// getters
impl BackendBuffer {
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.object.as_ref().map_or(0, |object| object.size())
    }

    /// 没有上传过数据时为 null
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.object.as_ref().map_or(vk::Buffer::null(), |object| object.vk_buffer())
    }
}

// update
impl BackendBuffer {
    /// 按 `data` 的大小重新分配，然后写入全部数据
    pub fn upload(&mut self, frame: &mut FrameResources, frame_num: u64, data: &[u8]) {
        assert!(!data.is_empty(), "upload of an empty buffer: {}", self.name);
        self.allocate_object(data.len() as vk::DeviceSize);
        self.update(frame, frame_num, 0, data, UpdateFlag::None);
    }

    /// 写入 `[start, start + data.len())`，不改变大小
    pub fn update(&mut self, frame: &mut FrameResources, frame_num: u64, start: usize, data: &[u8], flag: UpdateFlag) {
        let size = self.size();
        let ok = self.tracker.record(frame_num, flag);
        debug_assert!(ok, "buffer `{}` uploaded more than once in frame {frame_num}", self.name);

        if data.is_empty() {
            log::warn!("zero-sized update of buffer `{}` ignored", self.name);
            return;
        }
        let start = start as vk::DeviceSize;
        let len = data.len() as vk::DeviceSize;
        assert!(start < size, "update of `{}` starts at {start}, buffer size is {size}", self.name);
        assert!(start + len <= size, "update of `{}` overflows: {start} + {len} > {size}", self.name);

        let staging = frame.staging.alloc(len, FrameResourceSettings::STAGING_ALIGN);
        frame.staging.write_bytes(&staging, data);
        let region = vk::BufferCopy::default().src_offset(staging.offset).dst_offset(start).size(len);
        frame.cmd_copy.copy_buffer(staging.buffer, self.vk_buffer(), std::slice::from_ref(&region));
    }

    /// 大小不变时保留原有对象
    fn allocate_object(&mut self, size: vk::DeviceSize) {
        if self.size() == size {
            return;
        }

        let buffer = GfxBuffer::new(&self.device, self.allocator.clone(), size, self.usage.to_vk(), &self.name);
        // 旧对象 drop 时进入回收通道
        self.object = Some(Deferred::new(buffer, self.retired.clone()));
    }
}
