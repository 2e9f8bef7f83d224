//! The single lock-guarded block shared between the render thread and any
//! foreground callers.
//!
//! Programs, the current shader key and the uniform values all live behind one
//! `RwLock`: rendering reads the uniforms and the current program together, and
//! reload rebuilds the very program rendering would bind, so the three must
//! change under the same critical section.
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::SessionError;
use crate::program::ShaderProgram;
use crate::types::ShaderKey;

/// Scalar values pushed to the active program by name before every draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    values: BTreeMap<String, f32>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write per name wins.
    pub fn set(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<f32> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f32> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a UniformSet {
    type Item = (&'a String, &'a f32);
    type IntoIter = btree_map::Iter<'a, String, f32>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Registry of programs, the selected key, and the uniform values.
///
/// Invariant: `current`, when set, names a key present in `programs`.
#[derive(Debug, Default)]
pub struct RenderState {
    programs: HashMap<ShaderKey, ShaderProgram>,
    order: Vec<ShaderKey>,
    current: Option<ShaderKey>,
    uniforms: UniformSet,
}

impl RenderState {
    pub fn current(&self) -> Option<&ShaderKey> {
        self.current.as_ref()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.programs.contains_key(key)
    }

    pub fn program(&self, key: &str) -> Option<&ShaderProgram> {
        self.programs.get(key)
    }

    pub(crate) fn program_mut(&mut self, key: &str) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(key)
    }

    /// Keys in the order they were attached.
    pub fn keys(&self) -> &[ShaderKey] {
        &self.order
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    /// Registers `program` under `key`. The first program registered becomes
    /// current.
    pub(crate) fn insert(
        &mut self,
        key: ShaderKey,
        program: ShaderProgram,
    ) -> Result<(), SessionError> {
        if self.programs.contains_key(&key) {
            return Err(SessionError::DuplicateKey(key));
        }
        if self.current.is_none() {
            debug!(key = %key, "first shader attached; selecting it");
            self.current = Some(key.clone());
        }
        self.order.push(key.clone());
        self.programs.insert(key, program);
        Ok(())
    }

    pub(crate) fn select(&mut self, key: &str) -> Result<(), SessionError> {
        match self.programs.get_key_value(key) {
            Some((registered, _)) => {
                self.current = Some(registered.clone());
                Ok(())
            }
            None => Err(SessionError::UnknownShader(ShaderKey::new(key))),
        }
    }

    /// Empties the registry, handing the programs back for deletion.
    pub(crate) fn drain_programs(&mut self) -> Vec<(ShaderKey, ShaderProgram)> {
        self.current = None;
        self.order.clear();
        self.programs.drain().collect()
    }
}

/// Cloneable handle to the session's [`RenderState`].
///
/// Foreground threads use it to write uniforms and request shader switches
/// while the render thread is drawing.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<RenderState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_uniform(&self, name: impl Into<String>, value: f32) {
        self.inner.write().uniforms.set(name, value);
    }

    pub fn remove_uniform(&self, name: &str) -> Option<f32> {
        self.inner.write().uniforms.remove(name)
    }

    pub fn uniform(&self, name: &str) -> Option<f32> {
        self.inner.read().uniforms.get(name)
    }

    /// Switches the active shader; fails if `key` was never attached.
    pub fn select(&self, key: &str) -> Result<(), SessionError> {
        self.inner.write().select(key)
    }

    pub fn current_shader(&self) -> Option<ShaderKey> {
        self.inner.read().current.clone()
    }

    /// Registered keys in attach order.
    pub fn shader_keys(&self) -> Vec<ShaderKey> {
        self.inner.read().order.clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RenderState> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RenderState> {
        self.inner.write()
    }
}
