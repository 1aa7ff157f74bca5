//! Vulkan queues and sync primitives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;
use smallvec::SmallVec;

use crate::common::{FenceState, ObjectTag, QueueType};
use crate::device::{CommandBuffer, CommandQueue, Fence, RenderObject, Semaphore};
use crate::error::{GfxError, GfxResult};

use super::command::VulkanCommandBuffer;
use super::DeviceShared;

/// Completion tracking of one submission, shared by every command buffer in
/// it. When the queue had to create the fence itself, the tracker owns it.
pub(crate) struct SubmitTracker {
    shared: Arc<DeviceShared>,
    fence: vk::Fence,
    owned: bool,
}

impl SubmitTracker {
    pub fn is_complete(&self) -> GfxResult<bool> {
        match unsafe { self.shared.raw.get_fence_status(self.fence) } {
            Ok(signalled) => Ok(signalled),
            Err(e) => Err(self.shared.backend_err(e, "vkGetFenceStatus")),
        }
    }

    /// Blocks until the tracked submission has retired.
    pub fn wait_done(&self) {
        unsafe {
            let _ = self
                .shared
                .raw
                .wait_for_fences(&[self.fence], true, u64::MAX);
        }
    }
}

impl Drop for SubmitTracker {
    fn drop(&mut self) {
        if self.owned {
            // The submission may still be in flight; drain it before the
            // fence goes away.
            self.wait_done();
            unsafe {
                self.shared.raw.destroy_fence(self.fence, None);
            }
        }
    }
}

pub struct VulkanQueue {
    shared: Arc<DeviceShared>,
    queue_type: QueueType,
    family_index: u32,
    raw: vk::Queue,
    /// vkQueueSubmit requires external synchronization per queue.
    submit_lock: Mutex<()>,
    valid: AtomicBool,
}

impl VulkanQueue {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        queue_type: QueueType,
        family_index: u32,
        raw: vk::Queue,
    ) -> Self {
        Self {
            shared,
            queue_type,
            family_index,
            raw,
            submit_lock: Mutex::new(()),
            valid: AtomicBool::new(true),
        }
    }

    pub(crate) fn family_index(&self) -> u32 {
        self.family_index
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue")
            .field("type", &self.queue_type)
            .field("family", &self.family_index)
            .finish()
    }
}

impl RenderObject for VulkanQueue {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Queue
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl CommandQueue for VulkanQueue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn submit(
        &self,
        command_buffers: &mut [&mut dyn CommandBuffer],
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> GfxResult<()> {
        self.shared.check_alive()?;
        let mut raw_buffers: SmallVec<[vk::CommandBuffer; 8]> = SmallVec::new();
        for command_buffer in command_buffers.iter() {
            let vk_cb = command_buffer
                .as_any()
                .downcast_ref::<VulkanCommandBuffer>()
                .ok_or_else(|| {
                    GfxError::invalid_argument("command buffer is not a vulkan object")
                })?;
            // Submitting a non-executable buffer is a programmer error.
            if let Err(err) = vk_cb.state().submit() {
                panic!("{err}");
            }
            raw_buffers.push(vk_cb.raw_handle());
        }
        let waits: SmallVec<[vk::Semaphore; 4]> = wait_semaphores
            .iter()
            .filter_map(|s| {
                s.as_any()
                    .downcast_ref::<VulkanSemaphore>()
                    .map(|vs| vs.raw)
            })
            .collect();
        let wait_stages: SmallVec<[vk::PipelineStageFlags; 4]> =
            vec![vk::PipelineStageFlags::ALL_COMMANDS; waits.len()].into_iter().collect();
        let signals: SmallVec<[vk::Semaphore; 4]> = signal_semaphores
            .iter()
            .filter_map(|s| {
                s.as_any()
                    .downcast_ref::<VulkanSemaphore>()
                    .map(|vs| vs.raw)
            })
            .collect();

        let (fence_handle, owned) = match signal_fence {
            Some(fence) => {
                let vk_fence = fence
                    .as_any()
                    .downcast_ref::<VulkanFence>()
                    .ok_or_else(|| GfxError::invalid_argument("fence is not a vulkan object"))?;
                unsafe {
                    self.shared
                        .raw
                        .reset_fences(&[vk_fence.raw])
                        .map_err(|e| self.shared.backend_err(e, "vkResetFences"))?;
                }
                vk_fence.submitted.store(true, Ordering::Release);
                (vk_fence.raw, false)
            }
            None => {
                let create_info = vk::FenceCreateInfo::default();
                let fence = unsafe {
                    self.shared
                        .raw
                        .create_fence(&create_info, None)
                        .map_err(|e| self.shared.backend_err(e, "vkCreateFence"))?
                };
                (fence, true)
            }
        };

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&raw_buffers)
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signals);
        let result = {
            let _guard = self.submit_lock.lock().unwrap();
            unsafe { self.shared.raw.queue_submit(self.raw, &[submit_info], fence_handle) }
        };
        if let Err(e) = result {
            if owned {
                unsafe { self.shared.raw.destroy_fence(fence_handle, None) };
            }
            return Err(self.shared.backend_err(e, "vkQueueSubmit"));
        }

        let tracker = Arc::new(SubmitTracker {
            shared: self.shared.clone(),
            fence: fence_handle,
            owned,
        });
        for command_buffer in command_buffers.iter_mut() {
            let vk_cb = command_buffer
                .as_any_mut()
                .downcast_mut::<VulkanCommandBuffer>()
                .unwrap();
            vk_cb.mark_submitted(tracker.clone());
        }
        Ok(())
    }

    #[cfg(feature = "window")]
    fn present(
        &self,
        swap_chain: &mut dyn crate::device::SwapChain,
        wait_semaphores: &[&dyn Semaphore],
    ) -> GfxResult<()> {
        self.shared.check_alive()?;
        let chain = swap_chain
            .as_any_mut()
            .downcast_mut::<super::swapchain::VulkanSwapChain>()
            .ok_or_else(|| GfxError::invalid_argument("swap chain is not a vulkan object"))?;
        let waits: SmallVec<[vk::Semaphore; 4]> = wait_semaphores
            .iter()
            .filter_map(|s| {
                s.as_any()
                    .downcast_ref::<VulkanSemaphore>()
                    .map(|vs| vs.raw)
            })
            .collect();
        let _guard = self.submit_lock.lock().unwrap();
        chain.present(self.raw, &waits)
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let _guard = self.submit_lock.lock().unwrap();
        unsafe {
            self.shared
                .raw
                .queue_wait_idle(self.raw)
                .map_err(|e| self.shared.backend_err(e, "vkQueueWaitIdle"))
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) fn create_fence(shared: &Arc<DeviceShared>) -> GfxResult<Box<dyn Fence>> {
    let create_info = vk::FenceCreateInfo::default();
    let raw = unsafe {
        shared
            .raw
            .create_fence(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateFence"))?
    };
    Ok(Box::new(VulkanFence {
        shared: shared.clone(),
        raw,
        submitted: AtomicBool::new(false),
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanFence {
    shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Fence,
    pub(crate) submitted: AtomicBool,
    valid: AtomicBool,
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_fence(self.raw, None);
        }
    }
}

impl std::fmt::Debug for VulkanFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanFence")
            .field("state", &self.state())
            .finish()
    }
}

impl RenderObject for VulkanFence {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Fence
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Fence for VulkanFence {
    fn state(&self) -> FenceState {
        if !self.submitted.load(Ordering::Acquire) {
            return FenceState::NotSubmitted;
        }
        match unsafe { self.shared.raw.get_fence_status(self.raw) } {
            Ok(true) => FenceState::Complete,
            Ok(false) => FenceState::Incomplete,
            Err(_) => FenceState::Incomplete,
        }
    }

    fn wait(&self) -> GfxResult<()> {
        if !self.submitted.load(Ordering::Acquire) {
            return Err(GfxError::invalid_operation(
                "waiting on a fence that was never submitted".to_string(),
            ));
        }
        unsafe {
            self.shared
                .raw
                .wait_for_fences(&[self.raw], true, u64::MAX)
                .map_err(|e| self.shared.backend_err(e, "vkWaitForFences"))
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) fn wait_fences(shared: &Arc<DeviceShared>, fences: &[&dyn Fence]) -> GfxResult<()> {
    let mut raw: SmallVec<[vk::Fence; 8]> = SmallVec::new();
    for fence in fences {
        let vk_fence = fence
            .as_any()
            .downcast_ref::<VulkanFence>()
            .ok_or_else(|| GfxError::invalid_argument("fence is not a vulkan object"))?;
        if !vk_fence.submitted.load(Ordering::Acquire) {
            return Err(GfxError::invalid_operation(
                "waiting on a fence that was never submitted".to_string(),
            ));
        }
        raw.push(vk_fence.raw);
    }
    if raw.is_empty() {
        return Ok(());
    }
    unsafe {
        shared
            .raw
            .wait_for_fences(&raw, true, u64::MAX)
            .map_err(|e| shared.backend_err(e, "vkWaitForFences"))
    }
}

pub(crate) fn create_semaphore(shared: &Arc<DeviceShared>) -> GfxResult<Box<dyn Semaphore>> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let raw = unsafe {
        shared
            .raw
            .create_semaphore(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateSemaphore"))?
    };
    Ok(Box::new(VulkanSemaphore {
        shared: shared.clone(),
        raw,
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanSemaphore {
    shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Semaphore,
    valid: AtomicBool,
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_semaphore(self.raw, None);
        }
    }
}

impl std::fmt::Debug for VulkanSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSemaphore").finish()
    }
}

impl RenderObject for VulkanSemaphore {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Semaphore
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Semaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
