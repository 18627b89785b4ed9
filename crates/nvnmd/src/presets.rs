//! Reference configurations keyed by fitting-layer width.

use crate::tree::NvnmdTree;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<usize, NvnmdTree>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self {
            presets: BTreeMap::new(),
        }
    }

    pub fn with_default_presets() -> Self {
        let mut registry = Self::new();
        registry.register(128, preset_128());
        registry.register(256, preset_256());
        registry
    }

    pub fn register(&mut self, net_size: usize, tree: NvnmdTree) {
        self.presets.insert(net_size, tree);
    }

    pub fn find(&self, net_size: usize) -> Option<&NvnmdTree> {
        self.presets.get(&net_size)
    }

    pub fn net_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.presets.keys().copied()
    }
}

/// 128-wide fitting net; identical to the built-in template.
pub fn preset_128() -> NvnmdTree {
    NvnmdTree::template()
}

/// 256-wide fitting net with a larger neighbor budget.
pub fn preset_256() -> NvnmdTree {
    let mut tree = NvnmdTree::template();
    tree.dscp.sel = vec![128, 128, 128, 128];
    tree.dscp.ni = 256;
    tree.fitn.neuron = vec![256, 256, 256];
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_presets_are_keyed_by_first_layer() {
        let registry = PresetRegistry::with_default_presets();
        assert_eq!(registry.net_sizes().collect::<Vec<_>>(), vec![128, 256]);
        for net_size in registry.net_sizes() {
            let tree = registry.find(net_size).expect("preset");
            assert_eq!(tree.fitn.net_size(), Some(net_size));
        }
        assert!(registry.find(96).is_none());
    }

    #[test]
    fn registered_presets_override() {
        let mut registry = PresetRegistry::with_default_presets();
        let mut custom = preset_128();
        custom.ctrl.nstdm = 32;
        registry.register(128, custom);
        assert_eq!(registry.find(128).map(|t| t.ctrl.nstdm), Some(32));
    }
}
