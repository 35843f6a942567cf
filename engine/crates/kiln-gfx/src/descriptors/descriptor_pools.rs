//! 按 descriptor type 划分的描述符池链
//!
//! 每种类型维护一串固定预算的 pool，当前 pool 的预算不够时前进到下一个，
//! 没有下一个时创建新的 pool。帧槽位被复用时整体 reset。

use std::rc::Rc;

use ash::vk;
use indexmap::IndexMap;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::device::GfxDevice;

/// 描述符池分配器对设备的需求
pub trait DescriptorPoolDevice {
    fn create_pool(&self, ty: vk::DescriptorType, max_sets: u32, descriptor_count: u32)
    -> GfxResult<vk::DescriptorPool>;

    fn reset_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()>;

    fn destroy_pool(&self, pool: vk::DescriptorPool);
}

impl DescriptorPoolDevice for Rc<GfxDevice> {
    fn create_pool(
        &self,
        ty: vk::DescriptorType,
        max_sets: u32,
        descriptor_count: u32,
    ) -> GfxResult<vk::DescriptorPool> {
        let pool_sizes = [vk::DescriptorPoolSize::default().ty(ty).descriptor_count(descriptor_count)];
        let create_info = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(&pool_sizes);
        let pool = unsafe { self.create_descriptor_pool(&create_info, None).vk_context("vkCreateDescriptorPool")? };
        self.set_object_debug_name(pool, format!("DescriptorPool::{ty:?}"));
        Ok(pool)
    }

    fn reset_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()> {
        unsafe {
            self.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                .vk_context("vkResetDescriptorPool")
        }
    }

    fn destroy_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.destroy_descriptor_pool(pool, None);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorPoolDetails {
    pub pool: vk::DescriptorPool,
    pub ty: vk::DescriptorType,
    pub max_sets: u32,
    pub descriptor_count: u32,

    pub requested_sets: u32,
    pub requested_descriptors: u32,
}

impl DescriptorPoolDetails {
    #[inline]
    fn fits(&self, num_sets: u32, num_descriptors: u32) -> bool {
        self.requested_sets + num_sets <= self.max_sets
            && self.requested_descriptors + num_descriptors <= self.descriptor_count
    }
}

#[derive(Debug, Default)]
pub struct DescriptorPoolsContainer {
    pools: Vec<DescriptorPoolDetails>,
    current: usize,
}

impl DescriptorPoolsContainer {
    #[inline]
    pub fn pools(&self) -> &[DescriptorPoolDetails] {
        &self.pools
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }
}

pub struct DescriptorPoolAllocator<D: DescriptorPoolDevice> {
    device: D,
    containers: IndexMap<vk::DescriptorType, DescriptorPoolsContainer>,

    default_max_sets: u32,
    default_descriptor_count: u32,
}

// new & init
impl<D: DescriptorPoolDevice> DescriptorPoolAllocator<D> {
    pub fn new(device: D, default_max_sets: u32, default_descriptor_count: u32) -> Self {
        Self {
            device,
            containers: IndexMap::new(),
            default_max_sets,
            default_descriptor_count,
        }
    }
}

// getters
impl<D: DescriptorPoolDevice> DescriptorPoolAllocator<D> {
    #[inline]
    pub fn container(&self, ty: vk::DescriptorType) -> Option<&DescriptorPoolsContainer> {
        self.containers.get(&ty)
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }
}

// tools
impl<D: DescriptorPoolDevice> DescriptorPoolAllocator<D> {
    /// 预留 `num_sets` 个 set 以及 `num_descriptors` 个描述符，返回可以从中分配的 pool
    pub fn get_descriptor_pool(
        &mut self,
        num_sets: u32,
        ty: vk::DescriptorType,
        num_descriptors: u32,
    ) -> GfxResult<vk::DescriptorPool> {
        let container = self.containers.entry(ty).or_default();

        while container.current < container.pools.len() && !container.pools[container.current].fits(num_sets, num_descriptors)
        {
            container.current += 1;
        }

        if container.current == container.pools.len() {
            // 超出默认预算的请求使用按请求大小创建的 pool
            let max_sets = self.default_max_sets.max(num_sets);
            let descriptor_count = self.default_descriptor_count.max(num_descriptors);
            let pool = self.device.create_pool(ty, max_sets, descriptor_count)?;
            log::debug!(
                "new descriptor pool #{} for {:?}: {} sets, {} descriptors",
                container.pools.len(),
                ty,
                max_sets,
                descriptor_count
            );
            container.pools.push(DescriptorPoolDetails {
                pool,
                ty,
                max_sets,
                descriptor_count,
                requested_sets: 0,
                requested_descriptors: 0,
            });
        }

        let details = &mut container.pools[container.current];
        details.requested_sets += num_sets;
        details.requested_descriptors += num_descriptors;
        Ok(details.pool)
    }

    /// 帧槽位复用时调用：所有 pool 回到空的状态
    pub fn reset(&mut self) -> GfxResult<()> {
        for container in self.containers.values_mut() {
            for details in &mut container.pools {
                self.device.reset_pool(details.pool)?;
                details.requested_sets = 0;
                details.requested_descriptors = 0;
            }
            container.current = 0;
        }
        Ok(())
    }
}

impl<D: DescriptorPoolDevice> Drop for DescriptorPoolAllocator<D> {
    fn drop(&mut self) {
        for (_, container) in self.containers.drain(..) {
            for details in container.pools {
                self.device.destroy_pool(details.pool);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use ash::vk::Handle;

    use super::*;

    #[derive(Default)]
    struct MockDevice {
        created: RefCell<Vec<(vk::DescriptorType, u32, u32)>>,
        reset: RefCell<u32>,
        destroyed: Rc<RefCell<u32>>,
    }

    impl DescriptorPoolDevice for MockDevice {
        fn create_pool(
            &self,
            ty: vk::DescriptorType,
            max_sets: u32,
            descriptor_count: u32,
        ) -> GfxResult<vk::DescriptorPool> {
            self.created.borrow_mut().push((ty, max_sets, descriptor_count));
            Ok(vk::DescriptorPool::from_raw(self.created.borrow().len() as u64))
        }

        fn reset_pool(&self, _pool: vk::DescriptorPool) -> GfxResult<()> {
            *self.reset.borrow_mut() += 1;
            Ok(())
        }

        fn destroy_pool(&self, _pool: vk::DescriptorPool) {
            *self.destroyed.borrow_mut() += 1;
        }
    }

    const UBO: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC;
    const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

    #[test]
    fn test_budget_opens_new_pool() {
        let mut pools = DescriptorPoolAllocator::new(MockDevice::default(), 4, 8);

        let first = pools.get_descriptor_pool(2, UBO, 4).unwrap();
        let same = pools.get_descriptor_pool(2, UBO, 4).unwrap();
        assert_eq!(first, same);

        // set 预算已满
        let next = pools.get_descriptor_pool(1, UBO, 1).unwrap();
        assert_ne!(first, next);

        let container = pools.container(UBO).unwrap();
        assert_eq!(container.pools().len(), 2);
        assert_eq!(container.current_index(), 1);
        for details in container.pools() {
            assert!(details.requested_sets <= details.max_sets);
            assert!(details.requested_descriptors <= details.descriptor_count);
        }
    }

    #[test]
    fn test_descriptor_budget() {
        let mut pools = DescriptorPoolAllocator::new(MockDevice::default(), 100, 8);
        let first = pools.get_descriptor_pool(1, SAMPLER, 6).unwrap();
        let second = pools.get_descriptor_pool(1, SAMPLER, 3).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_types_are_separate() {
        let mut pools = DescriptorPoolAllocator::new(MockDevice::default(), 4, 8);
        let ubo = pools.get_descriptor_pool(1, UBO, 1).unwrap();
        let sampler = pools.get_descriptor_pool(1, SAMPLER, 1).unwrap();
        assert_ne!(ubo, sampler);
        assert_eq!(pools.device().created.borrow()[1], (SAMPLER, 4, 8));
    }

    #[test]
    fn test_oversized_request() {
        let mut pools = DescriptorPoolAllocator::new(MockDevice::default(), 4, 8);
        pools.get_descriptor_pool(10, UBO, 20).unwrap();
        assert_eq!(pools.device().created.borrow()[0], (UBO, 10, 20));
    }

    #[test]
    fn test_reset_reuses_pools() {
        let mut pools = DescriptorPoolAllocator::new(MockDevice::default(), 2, 2);
        let first = pools.get_descriptor_pool(2, UBO, 2).unwrap();
        pools.get_descriptor_pool(2, UBO, 2).unwrap();
        assert_eq!(pools.device().created.borrow().len(), 2);

        pools.reset().unwrap();
        assert_eq!(*pools.device().reset.borrow(), 2);
        assert_eq!(pools.container(UBO).unwrap().current_index(), 0);

        // reset 之后从第一个 pool 开始，不会创建新的 pool
        assert_eq!(pools.get_descriptor_pool(2, UBO, 2).unwrap(), first);
        pools.get_descriptor_pool(2, UBO, 2).unwrap();
        assert_eq!(pools.device().created.borrow().len(), 2);
    }

    #[test]
    fn test_drop_destroys_pools() {
        let device = MockDevice::default();
        let destroyed = device.destroyed.clone();
        let mut pools = DescriptorPoolAllocator::new(device, 1, 1);
        pools.get_descriptor_pool(1, UBO, 1).unwrap();
        pools.get_descriptor_pool(1, UBO, 1).unwrap();
        pools.get_descriptor_pool(1, SAMPLER, 1).unwrap();
        drop(pools);
        assert_eq!(*destroyed.borrow(), 3);
    }
}
