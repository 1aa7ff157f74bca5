//! Device memory management: buddy-suballocated chunks per memory type, with
//! dedicated allocations for large or explicitly dedicated resources.

use std::collections::HashMap;

use ash::vk;

use crate::alloc::{BlockAllocation, BlockAllocator, BlockSource, BuddyAllocation, BuddyAllocator};
use crate::error::{GfxError, GfxResult};

use super::vk_err;

/// Backing size of suballocated chunks.
const CHUNK_SIZE: u64 = 32 * 1024 * 1024;
/// Empty chunks kept around per memory type before release.
const KEEP_EMPTY_CHUNKS: usize = 1;

/// One `VkDeviceMemory` chunk, persistently mapped when host-visible. Frees
/// its memory on drop, including when the block allocator trims it.
pub(crate) struct MemoryChunk {
    device: ash::Device,
    pub memory: vk::DeviceMemory,
    pub mapped: *mut u8,
    #[allow(dead_code)]
    pub size: u64,
}

impl Drop for MemoryChunk {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

unsafe impl Send for MemoryChunk {}

struct ChunkSource {
    device: ash::Device,
    memory_type_index: u32,
    host_visible: bool,
}

impl BlockSource for ChunkSource {
    type Heap = MemoryChunk;
    type Sub = BuddyAllocator;

    fn create_heap(&mut self, size: usize) -> GfxResult<MemoryChunk> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size as u64)
            .memory_type_index(self.memory_type_index);
        let memory = unsafe {
            self.device
                .allocate_memory(&allocate_info, None)
                .map_err(|e| vk_err(e, "vkAllocateMemory"))?
        };
        let mapped = if self.host_visible {
            unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map_err(|e| {
                        self.device.free_memory(memory, None);
                        vk_err(e, "vkMapMemory")
                    })? as *mut u8
            }
        } else {
            std::ptr::null_mut()
        };
        Ok(MemoryChunk {
            device: self.device.clone(),
            memory,
            mapped,
            size: size as u64,
        })
    }

    fn create_sub_allocator(&mut self, size: usize) -> BuddyAllocator {
        BuddyAllocator::new(size)
    }
}

enum AllocationKind {
    Sub {
        memory_type_index: u32,
        block: BlockAllocation<BuddyAllocation>,
    },
    Dedicated,
}

/// A bound range of device memory. Holds everything a resource needs to map
/// and to hand the range back.
pub(crate) struct MemoryAllocation {
    pub memory: vk::DeviceMemory,
    pub offset: u64,
    #[allow(dead_code)]
    pub size: u64,
    /// Base of the mapped range (already offset), or null.
    pub mapped: *mut u8,
    kind: AllocationKind,
}

unsafe impl Send for MemoryAllocation {}
unsafe impl Sync for MemoryAllocation {}

pub(crate) struct DeviceMemoryAllocator {
    device: ash::Device,
    props: vk::PhysicalDeviceMemoryProperties,
    pools: HashMap<u32, BlockAllocator<ChunkSource>>,
}

impl DeviceMemoryAllocator {
    pub fn new(device: ash::Device, props: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device,
            props,
            pools: HashMap::new(),
        }
    }

    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..self.props.memory_type_count).find(|&i| {
            (type_bits & (1 << i)) != 0
                && self.props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
    }

    fn is_host_visible(&self, memory_type_index: u32) -> bool {
        self.props.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Carves a range satisfying `requirements` out of a chunk, or allocates
    /// dedicated memory for large / `Dedicated`-hinted resources.
    pub fn allocate(
        &mut self,
        requirements: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
        dedicated: bool,
    ) -> GfxResult<MemoryAllocation> {
        let memory_type_index = self
            .find_memory_type(requirements.memory_type_bits, required)
            .ok_or_else(|| {
                GfxError::not_supported(format!("no memory type with {required:?}"))
            })?;
        let host_visible = self.is_host_visible(memory_type_index);
        if dedicated || requirements.size > CHUNK_SIZE / 2 {
            let allocate_info = vk::MemoryAllocateInfo::default()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type_index);
            let memory = unsafe {
                self.device
                    .allocate_memory(&allocate_info, None)
                    .map_err(|e| vk_err(e, "vkAllocateMemory"))?
            };
            let mapped = if host_visible {
                unsafe {
                    self.device
                        .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                        .map_err(|e| {
                            self.device.free_memory(memory, None);
                            vk_err(e, "vkMapMemory")
                        })? as *mut u8
                }
            } else {
                std::ptr::null_mut()
            };
            return Ok(MemoryAllocation {
                memory,
                offset: 0,
                size: requirements.size,
                mapped,
                kind: AllocationKind::Dedicated,
            });
        }

        let device = self.device.clone();
        let pool = self.pools.entry(memory_type_index).or_insert_with(|| {
            BlockAllocator::new(
                ChunkSource {
                    device,
                    memory_type_index,
                    host_visible,
                },
                CHUNK_SIZE as usize,
                KEEP_EMPTY_CHUNKS,
            )
        });
        // Buddy offsets are multiples of the rounded request, so folding the
        // alignment into the size keeps the range aligned.
        let request = requirements.size.max(requirements.alignment) as usize;
        let block = pool.allocate(request)?;
        let chunk = pool.heap(block.block);
        let offset = block.start as u64;
        let mapped = if chunk.mapped.is_null() {
            std::ptr::null_mut()
        } else {
            unsafe { chunk.mapped.add(block.start) }
        };
        Ok(MemoryAllocation {
            memory: chunk.memory,
            offset,
            size: requirements.size,
            mapped,
            kind: AllocationKind::Sub {
                memory_type_index,
                block,
            },
        })
    }

    pub fn free(&mut self, allocation: MemoryAllocation) {
        match allocation.kind {
            AllocationKind::Dedicated => unsafe {
                self.device.free_memory(allocation.memory, None);
            },
            AllocationKind::Sub {
                memory_type_index,
                block,
            } => {
                if let Some(pool) = self.pools.get_mut(&memory_type_index) {
                    pool.destroy(block);
                }
            }
        }
    }

    /// Frees every remaining chunk. Called once at device teardown.
    pub fn release_all(&mut self) {
        self.pools.clear();
    }
}
