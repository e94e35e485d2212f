//! Growable descriptor pool.
//!
//! Descriptor pools have a fixed capacity. [`DynamicDescriptorPool`] keeps one
//! active pool and, when a request would exceed it, retires that pool at the
//! current serial and creates a fresh one with the same sizes. Sets already
//! handed out stay valid until the retired pool's serial completes.

use ash::vk;

use crate::backend::DeviceBackend;
use crate::deferred::GarbageObject;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Default number of sets a single pool can hold.
pub const DEFAULT_MAX_SETS_PER_POOL: u32 = 2048;

/// Semantic category of a descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DescriptorSetCategory {
    /// Uniform blocks.
    Uniforms = 0,
    /// Textures with their samplers.
    Textures = 1,
}

impl DescriptorSetCategory {
    /// Number of categories.
    pub const COUNT: usize = 2;

    /// Category a descriptor type counts towards.
    pub fn from_descriptor_type(ty: vk::DescriptorType) -> Option<Self> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
                Some(Self::Uniforms)
            }
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => Some(Self::Textures),
            _ => None,
        }
    }
}

/// A descriptor pool that replaces itself when exhausted.
#[derive(Debug)]
pub struct DynamicDescriptorPool {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    current_pool: Option<vk::DescriptorPool>,
    max_sets_per_pool: u32,
    current_sets_count: u32,
    capacity: [u32; DescriptorSetCategory::COUNT],
    free_descriptor_sets: [u32; DescriptorSetCategory::COUNT],
    force_new_pool: bool,
}

impl DynamicDescriptorPool {
    /// Create an uninitialized pool.
    pub fn new() -> Self {
        Self {
            pool_sizes: Vec::new(),
            current_pool: None,
            max_sets_per_pool: DEFAULT_MAX_SETS_PER_POOL,
            current_sets_count: 0,
            capacity: [0; DescriptorSetCategory::COUNT],
            free_descriptor_sets: [0; DescriptorSetCategory::COUNT],
            force_new_pool: false,
        }
    }

    /// Set the number of sets each pool can hold.
    pub fn with_max_sets_per_pool(mut self, max_sets_per_pool: u32) -> Self {
        self.max_sets_per_pool = max_sets_per_pool;
        self
    }

    /// Store the pool sizes and create the first pool.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] for descriptor types with
    /// no category, or the native error if pool creation fails.
    pub fn init<B: DeviceBackend>(
        &mut self,
        device: &GraphicsDevice<B>,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<(), GraphicsError> {
        debug_assert!(self.current_pool.is_none(), "descriptor pool initialized twice");

        let mut capacity = [0u32; DescriptorSetCategory::COUNT];
        for size in pool_sizes {
            let category = DescriptorSetCategory::from_descriptor_type(size.ty).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "descriptor type {:?} has no set category",
                    size.ty
                ))
            })?;
            let slot = &mut capacity[category as usize];
            *slot = slot.saturating_add(size.descriptor_count);
        }

        self.pool_sizes = pool_sizes.to_vec();
        self.capacity = capacity;
        self.allocate_new_pool(device)
    }

    /// Returns true once `init` has succeeded and until release/destroy.
    pub fn valid(&self) -> bool {
        self.current_pool.is_some()
    }

    /// Allocate one set per layout from `category`.
    ///
    /// Grows into a fresh pool first if the category or the set budget of
    /// the active pool cannot take the request.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::DescriptorPoolExhausted`] if even a fresh
    /// pool is too small, or the native error if creation or allocation fails.
    pub fn allocate_sets<B: DeviceBackend>(
        &mut self,
        device: &mut GraphicsDevice<B>,
        layouts: &[vk::DescriptorSetLayout],
        category: DescriptorSetCategory,
    ) -> Result<Vec<vk::DescriptorSet>, GraphicsError> {
        debug_assert!(self.valid(), "allocate_sets on an uninitialized descriptor pool");
        let requested = u32::try_from(layouts.len()).map_err(|_| {
            GraphicsError::InvalidParameter(format!("{} descriptor sets requested", layouts.len()))
        })?;
        let index = category as usize;

        let fresh_capacity = self.capacity[index];
        if requested > fresh_capacity || requested > self.max_sets_per_pool {
            return Err(GraphicsError::DescriptorPoolExhausted {
                category,
                requested,
                available: fresh_capacity.min(self.max_sets_per_pool),
            });
        }

        let over_budget = self
            .current_sets_count
            .checked_add(requested)
            .is_none_or(|total| total > self.max_sets_per_pool);
        if self.force_new_pool || self.free_descriptor_sets[index] < requested || over_budget {
            if let Some(pool) = self.current_pool.take() {
                let serial = device.current_queue_serial();
                device.release_object(serial, GarbageObject::DescriptorPool(pool));
            }
            log::debug!(
                "DynamicDescriptorPool: {category:?} exhausted after {} sets, growing",
                self.current_sets_count
            );
            self.allocate_new_pool(device)?;
        }

        let pool = self.current_pool.ok_or_else(|| {
            GraphicsError::Internal("descriptor pool has no active pool".to_string())
        })?;
        let sets = device.backend().allocate_descriptor_sets(pool, layouts)?;

        self.free_descriptor_sets[index] -= requested;
        self.current_sets_count += requested;
        Ok(sets)
    }

    /// Retire the active pool at the current serial and uninitialize.
    pub fn release<B: DeviceBackend>(&mut self, device: &mut GraphicsDevice<B>) {
        if let Some(pool) = self.current_pool.take() {
            let serial = device.current_queue_serial();
            device.release_object(serial, GarbageObject::DescriptorPool(pool));
        }
        self.reset_counters();
    }

    /// Destroy the active pool immediately and uninitialize.
    pub fn destroy<B: DeviceBackend>(&mut self, device: &GraphicsDevice<B>) {
        if let Some(pool) = self.current_pool.take() {
            device.backend().destroy_descriptor_pool(pool);
        }
        self.reset_counters();
    }

    /// Sets still available in `category` before the pool grows.
    pub fn free_descriptor_sets(&self, category: DescriptorSetCategory) -> u32 {
        self.free_descriptor_sets[category as usize]
    }

    /// Sets allocated from the active pool.
    pub fn current_sets_count(&self) -> u32 {
        self.current_sets_count
    }

    /// Set budget of each pool.
    pub fn max_sets_per_pool(&self) -> u32 {
        self.max_sets_per_pool
    }

    /// Handle of the active pool.
    pub fn current_pool(&self) -> Option<vk::DescriptorPool> {
        self.current_pool
    }

    /// Change the set budget and force the next allocation into a new pool.
    pub fn set_max_sets_per_pool_for_testing(&mut self, max_sets_per_pool: u32) {
        self.max_sets_per_pool = max_sets_per_pool;
        self.force_new_pool = true;
    }

    fn allocate_new_pool<B: DeviceBackend>(
        &mut self,
        device: &GraphicsDevice<B>,
    ) -> Result<(), GraphicsError> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets_per_pool)
            .pool_sizes(&self.pool_sizes);

        self.free_descriptor_sets = self.capacity;
        self.current_sets_count = 0;
        self.current_pool = Some(device.backend().create_descriptor_pool(&info)?);
        self.force_new_pool = false;
        Ok(())
    }

    fn reset_counters(&mut self) {
        self.force_new_pool = false;
        self.current_sets_count = 0;
        self.free_descriptor_sets = [0; DescriptorSetCategory::COUNT];
    }
}

impl Default for DynamicDescriptorPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DynamicDescriptorPool {
    fn drop(&mut self) {
        if self.current_pool.is_some() && !std::thread::panicking() {
            log::warn!("DynamicDescriptorPool dropped without release or destroy");
            debug_assert!(self.current_pool.is_none(), "descriptor pool leaked");
        }
    }
}
