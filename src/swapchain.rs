use crate::compositor::{
    ChainKey, Compositor, CompositorError, RawTexture, SessionId, TextureDescriptor,
};
use log::{debug, info};
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Index-based handle into the session's chain registry.
    pub struct ChainId;
}

/// One ring of compositor-owned textures. The current index rotates only on
/// commit and must be re-queried every frame.
pub struct SwapChain {
    key: ChainKey,
    textures: Vec<RawTexture>,
    valid: bool,
}

impl SwapChain {
    pub fn key(&self) -> ChainKey {
        self.key
    }

    pub fn depth(&self) -> usize {
        self.textures.len()
    }
}

/// Registry of all swap chains created under one session. Chains must be
/// destroyed before the session is torn down; dropping the registry with live
/// chains is a programming error and panics.
pub struct SwapChains {
    chains: SlotMap<ChainId, SwapChain>,
}

impl SwapChains {
    pub fn new() -> Self {
        Self {
            chains: SlotMap::with_key(),
        }
    }

    pub fn create<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        desc: &TextureDescriptor,
    ) -> Result<ChainId, CompositorError> {
        let (key, textures) = compositor.create_swap_chain(session, desc)?;
        info!(
            "created swap chain {:?}: {}x{} {:?}, depth {}",
            key,
            desc.width,
            desc.height,
            desc.format,
            textures.len()
        );
        Ok(self.chains.insert(SwapChain {
            key,
            textures,
            valid: true,
        }))
    }

    /// The texture to render into this frame.
    pub fn current_texture<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        id: ChainId,
    ) -> Result<RawTexture, CompositorError> {
        let chain = self.chains.get(id).ok_or(CompositorError::ChainInvalid)?;
        if !chain.valid {
            return Err(CompositorError::ChainInvalid);
        }
        let index = compositor.chain_current_index(session, chain.key)?;
        Ok(chain.textures[index])
    }

    /// Marks the current texture ready for the compositor and advances the
    /// ring cursor.
    pub fn commit<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        id: ChainId,
    ) -> Result<(), CompositorError> {
        let chain = self.chains.get(id).ok_or(CompositorError::ChainInvalid)?;
        if !chain.valid {
            return Err(CompositorError::ChainInvalid);
        }
        compositor.commit_swap_chain(session, chain.key)
    }

    pub fn key(&self, id: ChainId) -> Option<ChainKey> {
        self.chains.get(id).map(|chain| chain.key)
    }

    pub fn destroy<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        id: ChainId,
    ) {
        if let Some(chain) = self.chains.remove(id) {
            compositor.destroy_swap_chain(session, chain.key);
            debug!("destroyed swap chain {:?}", chain.key);
        }
    }

    pub fn destroy_all<C: Compositor>(&mut self, compositor: &mut C, session: SessionId) {
        for (_, chain) in self.chains.drain() {
            compositor.destroy_swap_chain(session, chain.key);
        }
    }

    /// Flips every chain invalid after a fatal session error. Further commit
    /// or current-texture calls refuse until the session is rebuilt.
    pub fn invalidate_all(&mut self) {
        for chain in self.chains.values_mut() {
            chain.valid = false;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl Default for SwapChains {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SwapChains {
    fn drop(&mut self) {
        if !self.chains.is_empty() && !std::thread::panicking() {
            panic!("SwapChains dropped with live chains; destroy them before session teardown");
        }
    }
}
