//! The six sections of the NVNMD configuration tree.
//!
//! Each section holds raw hyperparameters plus the fields derived from them.
//! Derived fields carry `#[serde(default)]` so a raw section (as written by a
//! user) deserializes without them; `derive` always recomputes every one.
//! On disk the field names follow the hardware convention (`M1`, `NNODE_FITS`,
//! `NBIT_SEL`, ...), kept here through serde renames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys a section does not model, carried through untouched.
pub type Passthrough = BTreeMap<String, Value>;

/// Smallest `k` with `2^k >= n`; zero for `n <= 1`.
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Smallest power of two `p` with `p >= nidp / 1.5`.
pub fn neighbor_capacity(nidp: usize) -> usize {
    (2 * nidp).div_ceil(3).next_power_of_two()
}

/// `dscp`: descriptor (embedding net and neighbor selection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub sel: Vec<usize>,
    pub rcut: f64,
    pub rcut_smth: f64,
    pub neuron: Vec<usize>,
    pub resnet_dt: bool,
    pub axis_neuron: usize,
    pub type_one_side: bool,
    #[serde(rename = "NI")]
    pub ni: usize,
    pub rc_lim: f64,
    /// Lower bound of interatomic distance.
    pub dmin: f64,
    pub smin: f64,
    pub smax: f64,
    pub ntype_max: usize,
    pub ntypex_max: usize,

    #[serde(rename = "M1", default)]
    pub m1: usize,
    #[serde(rename = "M2", default)]
    pub m2: usize,
    #[serde(rename = "SEL", default)]
    pub sel_padded: [usize; 4],
    #[serde(rename = "NNODE_FEAS", default)]
    pub nnode_feas: Vec<usize>,
    #[serde(default)]
    pub nlayer_fea: usize,
    #[serde(default)]
    pub same_net: usize,
    #[serde(rename = "NIDP", default)]
    pub nidp: usize,
    #[serde(rename = "NIX", default)]
    pub nix: usize,
    #[serde(default)]
    pub ntype: usize,
    #[serde(default)]
    pub ntypex: usize,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            sel: vec![60, 60, 60, 60],
            rcut: 6.0,
            rcut_smth: 0.5,
            neuron: vec![8, 16, 32],
            resnet_dt: false,
            axis_neuron: 4,
            type_one_side: true,
            ni: 128,
            rc_lim: 0.5,
            dmin: 0.0,
            smin: -2.0,
            smax: 14.0,
            ntype_max: 4,
            ntypex_max: 1,
            m1: 0,
            m2: 0,
            sel_padded: [0; 4],
            nnode_feas: Vec::new(),
            nlayer_fea: 0,
            same_net: 0,
            nidp: 0,
            nix: 0,
            ntype: 0,
            ntypex: 0,
            extra: Passthrough::new(),
        }
    }
}

impl Descriptor {
    pub fn derive(self) -> Self {
        let mut sel_padded = [0usize; 4];
        for (slot, count) in sel_padded.iter_mut().zip(&self.sel) {
            *slot = *count;
        }
        let same_net = usize::from(self.type_one_side);
        let nidp: usize = self.sel.iter().sum();
        let ntype = self.sel.len();

        Self {
            m1: self.neuron.last().copied().unwrap_or(0),
            m2: self.axis_neuron,
            sel_padded,
            nnode_feas: std::iter::once(1).chain(self.neuron.iter().copied()).collect(),
            nlayer_fea: self.neuron.len(),
            same_net,
            nidp,
            nix: neighbor_capacity(nidp),
            ntype,
            ntypex: if same_net == 1 { 1 } else { ntype },
            ..self
        }
    }
}

/// `fitn`: fitting network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingNet {
    pub neuron: Vec<usize>,
    pub resnet_dt: bool,

    #[serde(rename = "NNODE_FITS", default)]
    pub nnode_fits: Vec<usize>,
    #[serde(default)]
    pub nlayer_fit: usize,
    #[serde(rename = "NLAYER", default)]
    pub nlayer: usize,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl Default for FittingNet {
    fn default() -> Self {
        Self {
            neuron: vec![128, 128, 128],
            resnet_dt: false,
            nnode_fits: Vec::new(),
            nlayer_fit: 0,
            nlayer: 0,
            extra: Passthrough::new(),
        }
    }
}

impl FittingNet {
    /// Needs the derived descriptor for the input width `M1 * M2`.
    pub fn derive(self, dscp: &Descriptor) -> Self {
        let nnode_fits = std::iter::once(dscp.m1 * dscp.m2)
            .chain(self.neuron.iter().copied())
            .chain(std::iter::once(1))
            .collect();
        let nlayer_fit = self.neuron.len() + 1;
        Self {
            nnode_fits,
            nlayer_fit,
            nlayer: nlayer_fit,
            ..self
        }
    }

    /// Width of the first hidden layer, used as the preset key.
    pub fn net_size(&self) -> Option<usize> {
        self.neuron.first().copied()
    }
}

/// `dpin`: fields passed through from the conventional training input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepmdInput {
    #[serde(default)]
    pub type_map: Vec<String>,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl DeepmdInput {
    pub fn derive(self) -> Self {
        self
    }
}

/// `size`: memory capacity of the accelerator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Capacity {
    pub ntype_max: usize,
    pub nspu: usize,
    pub mspu: usize,
    #[serde(rename = "Na")]
    pub na: usize,
    #[serde(rename = "NaX")]
    pub nax: usize,

    #[serde(default)]
    pub naext: usize,
    #[serde(default)]
    pub ntype: usize,
    #[serde(default)]
    pub ntypex: usize,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            ntype_max: 4,
            nspu: 4096,
            mspu: 32768,
            na: 4096,
            nax: 32768,
            naext: 0,
            ntype: 0,
            ntypex: 0,
            extra: Passthrough::new(),
        }
    }
}

impl Capacity {
    pub fn derive(self, dscp: &Descriptor) -> Self {
        Self {
            naext: self.na,
            ntype: dscp.ntype_max,
            ntypex: dscp.ntypex_max,
            ..self
        }
    }
}

/// `ctrl`: control signals of the time-division pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Control {
    pub nstdm: usize,
    pub nstdm_m1: usize,
    pub nstdm_m2: usize,
    pub nstdm_m1x: usize,
    pub nstep_delay: usize,
    pub max_fanout: usize,

    #[serde(default)]
    pub nsadv: usize,
    #[serde(default)]
    pub nsel: usize,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            nstdm: 64,
            nstdm_m1: 32,
            nstdm_m2: 2,
            nstdm_m1x: 8,
            nstep_delay: 20,
            max_fanout: 30,
            nsadv: 0,
            nsel: 0,
            extra: Passthrough::new(),
        }
    }
}

impl Control {
    pub fn derive(self, dscp: &Descriptor) -> Self {
        Self {
            nsadv: self.nstdm + 1,
            nsel: self.nstdm * dscp.ntype_max,
            ..self
        }
    }

    /// The data-merge module packs `NSTDM_M1X` lanes into a 32-bit word.
    pub fn is_word_aligned(&self) -> bool {
        self.nstdm_m1x != 0 && 32 % self.nstdm_m1x == 0
    }
}

/// `nbit`: fixed-point bit widths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BitWidths {
    // floating point emulation: sign, exponent, fraction
    pub nbit_flts: u32,
    pub nbit_flte: u32,
    pub nbit_fltf: u32,
    pub nbit_fixd: u32,
    pub nbit_fixd_fl: u32,
    // atom
    pub nbit_spe_max: u32,
    pub nbit_lst_max: u32,
    pub nbit_crd: u32,
    pub nbit_crd_fl: u32,
    pub nbit_ene: u32,
    pub nbit_neib: u32,
    // fitting net
    pub nbit_fit_data: u32,
    pub nbit_fit_data_fl: u32,
    pub nbit_fit_short_fl: u32,
    pub nbit_fit_weight: u32,
    pub nbit_fit_disp: u32,
    pub nbit_fit_wxdb: u32,
    pub nbit_weight: u32,
    pub nbit_weight_fl: u32,
    // memory
    pub nbit_ram: u32,
    pub nbit_addr: u32,
    pub nbit_model_head: u32,
    pub nbit_th_long_add: u32,
    pub nbit_add: u32,
    pub range_b: [i64; 2],
    pub range_w: [i64; 2],
    pub ncfg: usize,
    pub nnet: usize,
    pub nfea: usize,

    #[serde(default)]
    pub nbit_fltm: u32,
    #[serde(default)]
    pub nbit_flth: u32,
    #[serde(default)]
    pub nbit_ene_fl: u32,
    #[serde(default)]
    pub nbit_spe: u32,
    #[serde(default)]
    pub nbit_lst: u32,
    #[serde(default)]
    pub nbit_crd3: u32,
    #[serde(default)]
    pub nbit_atom: u32,
    #[serde(default)]
    pub nbit_sel: u32,

    #[serde(flatten)]
    pub extra: Passthrough,
}

impl Default for BitWidths {
    fn default() -> Self {
        Self {
            nbit_flts: 1,
            nbit_flte: 8,
            nbit_fltf: 20,
            nbit_fixd: 32,
            nbit_fixd_fl: 23,
            nbit_spe_max: 8,
            nbit_lst_max: 16,
            nbit_crd: 32,
            nbit_crd_fl: 23,
            nbit_ene: 32,
            nbit_neib: 8,
            nbit_fit_data: 27,
            nbit_fit_data_fl: 23,
            nbit_fit_short_fl: 19,
            nbit_fit_weight: 18,
            nbit_fit_disp: 3,
            nbit_fit_wxdb: 29,
            nbit_weight: 32,
            nbit_weight_fl: 16,
            nbit_ram: 72,
            nbit_addr: 32,
            nbit_model_head: 32,
            nbit_th_long_add: 30,
            nbit_add: 15,
            range_b: [-100, 100],
            range_w: [-20, 20],
            ncfg: 35,
            nnet: 4920,
            nfea: 8192,
            nbit_fltm: 0,
            nbit_flth: 0,
            nbit_ene_fl: 0,
            nbit_spe: 0,
            nbit_lst: 0,
            nbit_crd3: 0,
            nbit_atom: 0,
            nbit_sel: 0,
            extra: Passthrough::new(),
        }
    }
}

impl BitWidths {
    /// Last stage: reads the descriptor, capacity and control sections.
    pub fn derive(self, dscp: &Descriptor, size: &Capacity, ctrl: &Control) -> Self {
        let nbit_fltm = self.nbit_fltf + 1;
        let nbit_spe = ceil_log2(dscp.ntype_max);
        let nbit_crd3 = 3 * self.nbit_crd;
        Self {
            nbit_fltm,
            nbit_flth: nbit_fltm + 1,
            nbit_ene_fl: self.nbit_fit_data_fl,
            nbit_spe,
            nbit_lst: ceil_log2(size.nax),
            nbit_crd3,
            nbit_atom: nbit_spe + nbit_crd3,
            nbit_sel: ceil_log2(ctrl.nsel),
            ..self
        }
    }
}
