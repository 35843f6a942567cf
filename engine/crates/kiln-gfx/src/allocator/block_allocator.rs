//! 块分配器
//!
//! 在一组 GPU buffer（block）上做 bump 分配，用于每帧的 staging / 流式顶点 / uniform 数据。
//! 每帧结束时调用 [`BlockBufferAllocator::clean`]，整帧的分配一次性回收，
//! 并根据本帧的用量调整下一帧第一个 block 的大小。

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// block 所在内存的访问方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMemoryUsage {
    /// 只由 CPU 访问，例如 staging buffer
    HostOnly,
    /// CPU 写入，GPU 读取
    HostToDevice,
}

/// 块分配器与底层 GPU 内存分配器之间的接口
pub trait BlockMemoryProvider {
    type Allocation;

    fn create_block(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: BlockMemoryUsage,
    ) -> GfxResult<(vk::Buffer, Self::Allocation)>;

    fn destroy_block(&self, buffer: vk::Buffer, allocation: &mut Self::Allocation);

    fn map(&self, allocation: &mut Self::Allocation) -> GfxResult<*mut u8>;

    fn unmap(&self, allocation: &mut Self::Allocation);

    fn flush(&self, allocation: &Self::Allocation, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()>;
}

struct Block<A> {
    buffer: vk::Buffer,
    allocation: A,
    size: vk::DeviceSize,
    /// auto map 模式下的持久映射
    auto_mapped: Option<*mut u8>,
    /// 非 auto map 模式下尚未 unmap 的次数
    map_count: u32,
}

impl<A> Block<A> {
    #[inline]
    fn is_mapped(&self) -> bool {
        self.auto_mapped.is_some() || self.map_count > 0
    }
}

/// 一次分配的结果
///
/// 只在发出它的那一帧有效：[`BlockBufferAllocator::clean`] 之后再使用会触发 debug 断言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationResult {
    pub buffer: vk::Buffer,
    pub block_index: usize,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    generation: u64,
}

pub struct BlockBufferAllocator<P: BlockMemoryProvider> {
    provider: P,

    usage: vk::BufferUsageFlags,
    memory: BlockMemoryUsage,
    auto_map: bool,

    min_block_size: vk::DeviceSize,
    /// 下一帧第一个 block 的最小尺寸，由 clean 根据用量调整
    first_block_heuristic: vk::DeviceSize,
    /// 自上次 clean 以来创建的所有 block 的总大小
    total_capacity: vk::DeviceSize,

    blocks: Vec<Block<P::Allocation>>,
    cursor: vk::DeviceSize,

    /// 每次 clean 加一，用于检查过期的 AllocationResult
    generation: u64,
    allocated_since_clean: bool,

    name: String,
}

// new & init
impl<P: BlockMemoryProvider> BlockBufferAllocator<P> {
    pub fn new(
        provider: P,
        min_block_size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: BlockMemoryUsage,
        auto_map: bool,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            usage,
            memory,
            auto_map,
            min_block_size,
            first_block_heuristic: 0,
            total_capacity: 0,
            blocks: Vec::new(),
            cursor: 0,
            generation: 0,
            allocated_since_clean: false,
            name: name.into(),
        }
    }
}

// getters
impl<P: BlockMemoryProvider> BlockBufferAllocator<P> {
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn block_sizes(&self) -> Vec<vk::DeviceSize> {
        self.blocks.iter().map(|b| b.size).collect()
    }

    #[inline]
    pub fn total_capacity(&self) -> vk::DeviceSize {
        self.total_capacity
    }

    #[inline]
    pub fn first_block_heuristic(&self) -> vk::DeviceSize {
        self.first_block_heuristic
    }

    #[inline]
    pub fn is_auto_map(&self) -> bool {
        self.auto_map
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

// 分配
impl<P: BlockMemoryProvider> BlockBufferAllocator<P> {
    /// bump 分配；最后一个 block 放不下时创建新的 block
    ///
    /// `amount` 不小于最后一个 block 的大小时，总是创建新的 block
    pub fn alloc(&mut self, amount: vk::DeviceSize, align: vk::DeviceSize) -> AllocationResult {
        let align = align.max(1);
        self.allocated_since_clean = true;

        if let Some(last) = self.blocks.last() {
            if amount < last.size {
                let offset = self.cursor.div_ceil(align) * align;
                if offset + amount < last.size {
                    self.cursor = offset + amount;
                    return self.make_result(self.blocks.len() - 1, offset, amount);
                }
            }
        }

        self.allocate_new_block(amount);
        debug_assert!(amount <= self.blocks[self.blocks.len() - 1].size, "failed to allocate new block");
        self.cursor = amount;
        self.make_result(self.blocks.len() - 1, 0, amount)
    }

    fn make_result(&self, block_index: usize, offset: vk::DeviceSize, size: vk::DeviceSize) -> AllocationResult {
        AllocationResult {
            buffer: self.blocks[block_index].buffer,
            block_index,
            offset,
            size,
            generation: self.generation,
        }
    }

    /// 新 block 的大小：
    /// `max(amount, 第一个 block 的启发值, min_block_size, 已创建的总容量)`，
    /// 请求本身达到 `min_block_size` 时，额外留出 `min_block_size` 的余量
    fn new_block_size(&self, amount: vk::DeviceSize) -> vk::DeviceSize {
        let first_block = if self.blocks.is_empty() { self.first_block_heuristic } else { 0 };
        let size = amount.max(first_block).max(self.min_block_size).max(self.total_capacity);
        if amount >= self.min_block_size { size.max(amount + self.min_block_size) } else { size }
    }

    fn allocate_new_block(&mut self, amount: vk::DeviceSize) {
        let size = self.new_block_size(amount);
        let (buffer, mut allocation) =
            self.provider.create_block(size, self.usage, self.memory).or_fatal("vmaCreateBuffer");

        let auto_mapped = if self.auto_map {
            Some(self.provider.map(&mut allocation).or_fatal("vmaMapMemory"))
        } else {
            None
        };

        log::debug!("[{}] new block #{} of {} bytes", self.name, self.blocks.len(), size);
        self.total_capacity += size;
        self.blocks.push(Block {
            buffer,
            allocation,
            size,
            auto_mapped,
            map_count: 0,
        });
        self.cursor = 0;
    }
}

// 映射
impl<P: BlockMemoryProvider> BlockBufferAllocator<P> {
    /// 返回指向分配起始位置的指针
    ///
    /// auto map 模式下直接返回持久映射的地址
    pub fn map_memory(&mut self, allocation: &AllocationResult) -> *mut u8 {
        debug_assert_eq!(allocation.generation, self.generation, "allocation used after clean()");
        let offset = allocation.offset as usize;
        let block = &mut self.blocks[allocation.block_index];

        let base = match block.auto_mapped {
            Some(ptr) => ptr,
            None => {
                let ptr = self.provider.map(&mut block.allocation).or_fatal("vmaMapMemory");
                block.map_count += 1;
                ptr
            }
        };
        unsafe { base.add(offset) }
    }

    /// auto map 模式下什么也不做，需要使用 [`Self::unmap_automapped_memory`]
    pub fn unmap_memory(&mut self, allocation: &AllocationResult) {
        debug_assert_eq!(allocation.generation, self.generation, "allocation used after clean()");
        let block = &mut self.blocks[allocation.block_index];
        if block.auto_mapped.is_some() {
            return;
        }

        assert!(block.map_count > 0, "unmap without a matching map");
        self.provider.unmap(&mut block.allocation);
        block.map_count -= 1;
    }

    /// map、拷贝、unmap
    pub fn write_bytes(&mut self, allocation: &AllocationResult, data: &[u8]) {
        assert!(data.len() as vk::DeviceSize <= allocation.size, "write exceeds allocation size");
        let dst = self.map_memory(allocation);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        self.unmap_memory(allocation);
    }

    pub fn unmap_automapped_memory(&mut self) {
        assert!(self.auto_map, "only useful for auto-mapped allocators");
        for block in &mut self.blocks {
            if block.auto_mapped.take().is_some() {
                self.provider.unmap(&mut block.allocation);
            }
        }
    }

    pub fn flush_automapped_memory(&self) -> GfxResult<()> {
        assert!(self.auto_map, "only useful for auto-mapped allocators");
        for block in &self.blocks {
            assert!(block.auto_mapped.is_some(), "block must still be (auto-)mapped");
            self.provider.flush(&block.allocation, 0, vk::WHOLE_SIZE)?;
        }
        Ok(())
    }
}

// 回收
impl<P: BlockMemoryProvider> BlockBufferAllocator<P> {
    /// 帧结束时的回收
    ///
    /// - 本帧用了不止一个 block：启发值设为总大小，释放所有 block，下一帧合并为一个大 block
    /// - 用量不足启发值的 1/4：启发值减半
    /// - 启发值变化且大于 `min_block_size`：释放所有 block
    ///
    /// 自上次 clean 以来没有任何分配时，启发值保持不变
    pub fn clean(&mut self) {
        let _span = tracy_client::span!("BlockBufferAllocator::clean");

        let total_allocated: vk::DeviceSize = self.blocks.iter().map(|b| b.size).sum();
        let total_used = match self.blocks.last() {
            Some(last) => total_allocated - (last.size - self.cursor),
            None => 0,
        };

        let old_heuristic = self.first_block_heuristic;
        if self.allocated_since_clean {
            if self.blocks.len() > 1 {
                self.first_block_heuristic = total_allocated;
            } else if total_used < self.first_block_heuristic / 4 {
                self.first_block_heuristic /= 2;
            }
        }

        let heuristic_changed = old_heuristic != self.first_block_heuristic;
        if self.blocks.len() > 1 || (heuristic_changed && self.first_block_heuristic > self.min_block_size) {
            log::trace!(
                "[{}] release {} blocks, used {} of {}, next first block {}",
                self.name,
                self.blocks.len(),
                total_used,
                total_allocated,
                self.first_block_heuristic
            );
            self.release_all_blocks();
        }
        debug_assert!(self.blocks.len() <= 1, "should either be 0 or 1 retained block");

        if self.auto_map {
            for block in &mut self.blocks {
                if block.auto_mapped.is_none() {
                    block.auto_mapped = Some(self.provider.map(&mut block.allocation).or_fatal("vmaMapMemory"));
                }
            }
        }

        self.cursor = 0;
        self.total_capacity = self.blocks.last().map_or(0, |b| b.size);
        self.generation += 1;
        self.allocated_since_clean = false;
    }

    fn release_all_blocks(&mut self) {
        for mut block in self.blocks.drain(..) {
            assert!(!block.is_mapped(), "[{}] block still mapped, missing unmap_automapped_memory()", self.name);
            self.provider.destroy_block(block.buffer, &mut block.allocation);
        }
    }
}

impl<P: BlockMemoryProvider> Drop for BlockBufferAllocator<P> {
    fn drop(&mut self) {
        if self.auto_map {
            self.unmap_automapped_memory();
        }
        self.release_all_blocks();
    }
}
