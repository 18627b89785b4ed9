//! The configuration tree and its fixed derivation order.

use crate::sections::{BitWidths, Capacity, Control, DeepmdInput, Descriptor, FittingNet};
use crate::warning::ConfigWarning;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvnmdTree {
    pub dscp: Descriptor,
    pub fitn: FittingNet,
    pub dpin: DeepmdInput,
    pub size: Capacity,
    pub ctrl: Control,
    pub nbit: BitWidths,
}

impl Default for NvnmdTree {
    /// The built-in template with every derived field filled in.
    fn default() -> Self {
        Self::template().derive_sections()
    }
}

impl NvnmdTree {
    /// Raw template values; derived fields are left at zero.
    pub fn template() -> Self {
        Self {
            dscp: Descriptor::default(),
            fitn: FittingNet::default(),
            dpin: DeepmdInput::default(),
            size: Capacity::default(),
            ctrl: Control::default(),
            nbit: BitWidths::default(),
        }
    }

    /// Reject raw inputs the derivation cannot work with.
    ///
    /// Besides non-empty `sel`/`neuron` lists and non-zero sizes, this also
    /// requires `axis_neuron > 0`, `rcut > rcut_smth`, and values small enough
    /// that every derived count and bit width fits its integer type.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.dscp.sel.is_empty(), "dscp.sel must list at least one type");
        ensure!(!self.dscp.neuron.is_empty(), "dscp.neuron must not be empty");
        ensure!(self.dscp.axis_neuron > 0, "dscp.axis_neuron must be > 0");
        ensure!(
            self.dscp.rcut > self.dscp.rcut_smth,
            "dscp.rcut ({}) must exceed dscp.rcut_smth ({})",
            self.dscp.rcut,
            self.dscp.rcut_smth
        );
        ensure!(self.dscp.ntype_max > 0, "dscp.ntype_max must be > 0");
        ensure!(!self.fitn.neuron.is_empty(), "fitn.neuron must not be empty");
        ensure!(self.size.nax > 0, "size.NaX must be > 0");
        ensure!(self.ctrl.nstdm > 0, "ctrl.NSTDM must be > 0");
        ensure!(self.ctrl.nstdm_m1x > 0, "ctrl.NSTDM_M1X must be > 0");
        self.validate_magnitudes()
    }

    fn validate_magnitudes(&self) -> Result<()> {
        let nidp = self
            .dscp
            .sel
            .iter()
            .try_fold(0usize, |total, &count| total.checked_add(count));
        // neighbor_capacity needs headroom up to 4 * NIDP
        ensure!(
            nidp.and_then(|n| n.checked_mul(4)).is_some(),
            "dscp.sel {:?} is too large",
            self.dscp.sel
        );
        let m1 = self.dscp.neuron.last().copied().unwrap_or(0);
        ensure!(
            m1.checked_mul(self.dscp.axis_neuron).is_some(),
            "fitting input width {m1} x {} overflows",
            self.dscp.axis_neuron
        );
        ensure!(
            self.ctrl.nstdm.checked_add(1).is_some()
                && self.ctrl.nstdm.checked_mul(self.dscp.ntype_max).is_some(),
            "ctrl.NSTDM ({}) x dscp.ntype_max ({}) overflows",
            self.ctrl.nstdm,
            self.dscp.ntype_max
        );
        ensure!(
            self.nbit.nbit_fltf.checked_add(2).is_some(),
            "nbit.NBIT_FLTF ({}) is too large",
            self.nbit.nbit_fltf
        );
        ensure!(
            self.nbit
                .nbit_crd
                .checked_mul(3)
                .and_then(|crd3| crd3.checked_add(usize::BITS))
                .is_some(),
            "nbit.NBIT_CRD ({}) is too large",
            self.nbit.nbit_crd
        );
        Ok(())
    }

    /// Stage order: descriptor, fitting net, passthrough, size, control,
    /// bit widths. Each later stage reads derived fields of earlier ones.
    fn derive_sections(self) -> Self {
        let Self {
            dscp,
            fitn,
            dpin,
            size,
            ctrl,
            nbit,
        } = self;

        let dscp = dscp.derive();
        let fitn = fitn.derive(&dscp);
        let dpin = dpin.derive();
        let size = size.derive(&dscp);
        let ctrl = ctrl.derive(&dscp);
        let nbit = nbit.derive(&dscp, &size, &ctrl);

        Self {
            dscp,
            fitn,
            dpin,
            size,
            ctrl,
            nbit,
        }
    }

    /// Non-fatal hardware constraints violated by this tree.
    pub fn diagnostics(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if !self.ctrl.is_word_aligned() {
            warnings.push(ConfigWarning::InvalidDivisibility {
                nstdm_m1x: self.ctrl.nstdm_m1x,
            });
        }
        warnings
    }
}

/// Validate a raw tree and compute every derived field.
pub fn derive_tree(raw: NvnmdTree) -> Result<NvnmdTree> {
    raw.validate()?;
    Ok(raw.derive_sections())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tree_is_derived() {
        let tree = NvnmdTree::default();
        assert_eq!(tree.dscp.m1, 32);
        assert_eq!(tree.fitn.nnode_fits, vec![128, 128, 128, 128, 1]);
        assert_eq!(tree.nbit.nbit_sel, 8);
        assert!(tree.diagnostics().is_empty());
    }

    #[test]
    fn rederivation_leaves_no_stale_fields() -> Result<()> {
        let mut tree = NvnmdTree::default();
        tree.dscp.neuron = vec![4, 8];
        tree.dscp.axis_neuron = 2;
        tree.dscp.ntype_max = 2;
        tree.ctrl.nstdm = 16;

        let tree = derive_tree(tree)?;
        assert_eq!(tree.dscp.m1, 8);
        assert_eq!(tree.fitn.nnode_fits[0], 16);
        assert_eq!(tree.size.ntype, 2);
        assert_eq!(tree.ctrl.nsel, 32);
        assert_eq!(tree.nbit.nbit_sel, 5);
        assert_eq!(tree.nbit.nbit_spe, 1);
        Ok(())
    }

    #[test]
    fn derivation_is_idempotent() -> Result<()> {
        let once = NvnmdTree::default();
        let twice = derive_tree(once.clone())?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn incomplete_inputs_are_rejected() {
        let mut tree = NvnmdTree::template();
        tree.dscp.neuron.clear();
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.fitn.neuron.clear();
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.dscp.rcut_smth = 7.0;
        assert!(derive_tree(tree).is_err());
    }

    #[test]
    fn oversized_inputs_are_rejected() {
        let mut tree = NvnmdTree::template();
        tree.dscp.sel = vec![usize::MAX / 2 + 1];
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.dscp.sel = vec![usize::MAX / 2, usize::MAX / 2];
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.dscp.neuron = vec![usize::MAX];
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.ctrl.nstdm = usize::MAX;
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.nbit.nbit_fltf = u32::MAX;
        assert!(derive_tree(tree).is_err());

        let mut tree = NvnmdTree::template();
        tree.nbit.nbit_crd = u32::MAX / 2;
        assert!(derive_tree(tree).is_err());
    }

    #[test]
    fn misaligned_lanes_produce_a_warning() -> Result<()> {
        let mut tree = NvnmdTree::template();
        tree.ctrl.nstdm_m1x = 6;
        let tree = derive_tree(tree)?;
        assert_eq!(
            tree.diagnostics(),
            vec![ConfigWarning::InvalidDivisibility { nstdm_m1x: 6 }]
        );
        Ok(())
    }

    #[test]
    fn raw_json_without_derived_fields_deserializes() -> Result<()> {
        let raw = serde_json::json!({
            "dscp": {
                "sel": [46, 92], "rcut": 6.0, "rcut_smth": 0.5, "neuron": [25, 50],
                "resnet_dt": false, "axis_neuron": 4, "type_one_side": false,
                "NI": 128, "rc_lim": 0.5, "dmin": 0, "smin": -2, "smax": 14,
                "ntype_max": 4, "ntypex_max": 1
            },
            "fitn": {"neuron": [128, 128, 128], "resnet_dt": false},
            "dpin": {"type_map": []},
            "size": {"NTYPE_MAX": 4, "NSPU": 4096, "MSPU": 32768, "Na": 4096, "NaX": 32768},
            "ctrl": {
                "NSTDM": 64, "NSTDM_M1": 32, "NSTDM_M2": 2, "NSTDM_M1X": 8,
                "NSTEP_DELAY": 20, "MAX_FANOUT": 30
            },
            "nbit": serde_json::to_value(BitWidths::default())?
        });
        let tree: NvnmdTree = serde_json::from_value(raw)?;
        let tree = derive_tree(tree)?;
        assert_eq!(tree.dscp.nidp, 138);
        assert_eq!(tree.fitn.nnode_fits[0], 200);
        Ok(())
    }
}
