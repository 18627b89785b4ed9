//! Built-in conventional training input and log banner.

use serde_json::{json, Value};

pub const NVNMD_WELCOME: &[&str] = &[
    " _   _  __     __  _   _   __  __   ____  ",
    "| \\ | | \\ \\   / / | \\ | | |  \\/  | |  _ \\ ",
    "|  \\| |  \\ \\ / /  |  \\| | | |\\/| | | | | |",
    "| |\\  |   \\ V /   | |\\  | | |  | | | |_| |",
    "|_| \\_|    \\_/    |_| \\_| |_|  |_| |____/ ",
    "",
    "//=================================================//",
    "//    non-von Neumann Molecular Dynamics (NVNMD)    //",
    "//=================================================//",
];

pub const NVNMD_CITATION: &[&str] = &[
    "Please read and cite:",
    "Mo et al., npj Comput Mater 8, 107 (2022)",
    "DOI: 10.1038/s41524-022-00773-z",
];

/// Training input the exported script starts from.
pub fn deepmd_input_template() -> Value {
    json!({
        "model": {
            "descriptor": {
                "seed": 1,
                "type": "se_a",
                "sel": [60, 60],
                "rcut": 6.0,
                "rcut_smth": 0.5,
                "neuron": [8, 16, 32],
                "type_one_side": false,
                "axis_neuron": 4,
                "resnet_dt": false
            },
            "fitting_net": {
                "seed": 1,
                "neuron": [128, 128, 128],
                "resnet_dt": false
            }
        },
        "nvnmd": {
            "net_size": 128,
            "config_file": "none",
            "weight_file": "none",
            "map_file": "none",
            "enable": false,
            "restore_descriptor": false,
            "restore_fitting_net": false,
            "quantize_descriptor": false,
            "quantize_fitting_net": false
        },
        "learning_rate": {
            "type": "exp",
            "decay_steps": 5000,
            "start_lr": 0.005,
            "stop_lr": 8.257687192506788e-05
        },
        "loss": {
            "start_pref_e": 0.02,
            "limit_pref_e": 2,
            "start_pref_f": 1000,
            "limit_pref_f": 1,
            "start_pref_v": 0,
            "limit_pref_v": 0
        },
        "training": {
            "seed": 1,
            "stop_batch": 10000,
            "disp_file": "lcurve.out",
            "disp_freq": 100,
            "numb_test": 10,
            "save_freq": 1000,
            "save_ckpt": "model.ckpt",
            "disp_training": true,
            "time_training": true,
            "profiling": false,
            "training_data": {
                "systems": "dataset",
                "set_prefix": "set",
                "batch_size": 1
            }
        }
    })
}
