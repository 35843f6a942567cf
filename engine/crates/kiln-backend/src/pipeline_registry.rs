//! 管线注册表
//!
//! 上层持有稳定的 [`PipelineId`]，交换链重建后 id 仍然有效。每个条目记录创建时 render pass 的
//! 兼容性快照；重建交换链后调用 [`PipelineRegistry::rebuild_if_necessary`]，只有快照与新的
//! render pass 不兼容的条目才会重新创建。

use std::rc::Rc;

use ash::vk;
use indexmap::IndexMap;
use kiln_gfx::error::GfxResult;
use kiln_gfx::render_pass::compat::RenderPassCompat;
use kiln_render_interface::pipeline_desc::GraphicsPipelineDesc;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// 指向注册表中的一个 pipeline，跨交换链重建保持有效
    pub struct PipelineId;
}

/// 当前可以用于创建 pipeline 的 render pass
#[derive(Clone)]
pub struct LivePass {
    pub render_pass: vk::RenderPass,
    pub compat: Rc<RenderPassCompat>,
    pub samples: vk::SampleCountFlags,
}

/// 根据描述创建、销毁实际的 pipeline 对象
pub trait PipelineBuilder {
    type Pipeline;

    fn build(&self, desc: &GraphicsPipelineDesc, live: &LivePass) -> GfxResult<Self::Pipeline>;

    fn destroy(&self, pipeline: Self::Pipeline);
}

struct PipelineEntry<P> {
    desc: GraphicsPipelineDesc,
    pipeline: P,
    compat: Rc<RenderPassCompat>,
    samples: vk::SampleCountFlags,
}

pub struct PipelineRegistry<B: PipelineBuilder> {
    builder: B,
    entries: SlotMap<PipelineId, PipelineEntry<B::Pipeline>>,
    /// 相同描述只创建一次
    by_desc: IndexMap<GraphicsPipelineDesc, PipelineId>,
}

// new & init
impl<B: PipelineBuilder> PipelineRegistry<B> {
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            entries: SlotMap::with_key(),
            by_desc: IndexMap::new(),
        }
    }
}

// getters
impl<B: PipelineBuilder> PipelineRegistry<B> {
    #[inline]
    pub fn builder(&self) -> &B {
        &self.builder
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, id: PipelineId) -> Option<&B::Pipeline> {
        self.entries.get(id).map(|entry| &entry.pipeline)
    }

    #[inline]
    pub fn desc(&self, id: PipelineId) -> Option<&GraphicsPipelineDesc> {
        self.entries.get(id).map(|entry| &entry.desc)
    }

    /// 注册顺序
    pub fn ids(&self) -> impl Iterator<Item = PipelineId> + '_ {
        self.by_desc.values().copied()
    }
}

// update
impl<B: PipelineBuilder> PipelineRegistry<B> {
    /// 已经存在相同描述的 pipeline 时直接返回其 id
    pub fn build(&mut self, desc: &GraphicsPipelineDesc, live: &LivePass) -> GfxResult<PipelineId> {
        if let Some(id) = self.by_desc.get(desc) {
            return Ok(*id);
        }

        let _span = tracy_client::span!("PipelineRegistry::build");
        let pipeline = self.builder.build(desc, live)?;
        let id = self.entries.insert(PipelineEntry {
            desc: desc.clone(),
            pipeline,
            compat: live.compat.clone(),
            samples: live.samples,
        });
        self.by_desc.insert(desc.clone(), id);
        log::debug!("pipeline registered: {} + {}", desc.vertex_shader, desc.fragment_shader);
        Ok(id)
    }

    /// 与 `live` 不兼容的 pipeline 原地重建，id 不变
    ///
    /// # return
    /// 重建的数量
    pub fn rebuild_if_necessary(&mut self, live: &LivePass) -> GfxResult<usize> {
        let _span = tracy_client::span!("PipelineRegistry::rebuild_if_necessary");

        let mut rebuilt = 0;
        for entry in self.entries.values_mut() {
            if entry.samples == live.samples && entry.compat.is_compatible_with(&live.compat) {
                continue;
            }

            let pipeline = self.builder.build(&entry.desc, live)?;
            let old = std::mem::replace(&mut entry.pipeline, pipeline);
            self.builder.destroy(old);
            entry.compat = live.compat.clone();
            entry.samples = live.samples;
            rebuilt += 1;
        }

        if rebuilt > 0 {
            log::info!("{rebuilt} of {} pipelines rebuilt for the new render pass", self.entries.len());
        }
        Ok(rebuilt)
    }
}

// destroy
impl<B: PipelineBuilder> PipelineRegistry<B> {
    /// 调用者保证 GPU 已经空闲
    pub fn destroy(mut self) {
        for (_, entry) in self.entries.drain() {
            self.builder.destroy(entry.pipeline);
        }
        self.by_desc.clear();
    }
}
