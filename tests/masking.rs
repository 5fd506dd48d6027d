//! Integration tests for node masks.
//!
//! A masked node must be invisible: removing it from the input leaves the
//! outputs of every other node unchanged, and it never receives a
//! coordinate update.

use geomr::model::{EnTransformerConfig, EquivariantAttention};
use geomr::ops::node_mask_from_bools;
use numr::autograd::Var;
use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
use numr::tensor::Tensor;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const D: usize = 6;

fn setup() -> (CpuClient, CpuDevice) {
    let device = CpuDevice::new();
    let client = CpuClient::new(device.clone());
    (client, device)
}

fn config(neighbor_count: usize) -> EnTransformerConfig {
    let mut config = EnTransformerConfig::new(D, 1);
    config.heads = 2;
    config.head_dim = 3;
    config.message_dim = 5;
    config.fourier_bands = 2;
    config.neighbor_count = neighbor_count;
    config.param_init_scale = 0.3;
    config.seed = 21;
    config
}

fn var(data: &[f32], shape: &[usize], device: &CpuDevice) -> Var<CpuRuntime> {
    Var::new(Tensor::<CpuRuntime>::from_slice(data, shape, device), false)
}

fn assert_close(a: &[f32], b: &[f32], what: &str) {
    assert_eq!(a.len(), b.len(), "{what}: length");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= 1e-5 + 1e-5 * x.abs(), "{what}[{i}]: {x} vs {y}");
    }
}

/// Four nodes; the last one is padding placed right next to node 0.
fn padded_inputs() -> (Vec<f32>, Vec<f32>) {
    let feats: Vec<f32> = (0..4 * D).map(|i| ((i * 5 % 7) as f32 - 3.0) * 0.4).collect();
    let coors = vec![
        0.0, 0.0, 0.0, //
        1.2, 0.3, -0.4, //
        -0.6, 1.9, 0.8, //
        0.05, 0.02, 0.01,
    ];
    (feats, coors)
}

fn check_masked_node_is_invisible(neighbor_count: usize) -> TestResult {
    let (client, device) = setup();
    let block = EquivariantAttention::<CpuRuntime>::from_config(&config(neighbor_count), &device)?;
    let (feats, coors) = padded_inputs();

    let mask = node_mask_from_bools::<CpuRuntime>(&[true, true, true, false], 1, 4, &device)?;
    let (df, dc) = block.forward(
        &client,
        &var(&feats, &[1, 4, D], &device),
        &var(&coors, &[1, 4, 3], &device),
        None,
        Some(&mask),
        None,
    )?;
    let df: Vec<f32> = df.tensor().to_vec();
    let dc: Vec<f32> = dc.tensor().to_vec();

    let (rf, rc) = block.forward(
        &client,
        &var(&feats[..3 * D], &[1, 3, D], &device),
        &var(&coors[..9], &[1, 3, 3], &device),
        None,
        None,
        None,
    )?;

    assert_close(&df[..3 * D], &rf.tensor().to_vec::<f32>(), "features of real nodes");
    assert_close(&dc[..9], &rc.tensor().to_vec::<f32>(), "coordinates of real nodes");
    assert_eq!(&dc[9..], &[0.0, 0.0, 0.0], "padding node must not move");
    Ok(())
}

#[test]
fn test_masked_node_is_invisible_dense() -> TestResult {
    check_masked_node_is_invisible(0)
}

#[test]
fn test_masked_node_is_invisible_top_k() -> TestResult {
    check_masked_node_is_invisible(2)
}

#[test]
fn test_all_ones_mask_matches_no_mask() -> TestResult {
    let (client, device) = setup();
    let block = EquivariantAttention::<CpuRuntime>::from_config(&config(0), &device)?;
    let (feats, coors) = padded_inputs();
    let f = var(&feats, &[1, 4, D], &device);
    let c = var(&coors, &[1, 4, 3], &device);

    let mask = node_mask_from_bools::<CpuRuntime>(&[true; 4], 1, 4, &device)?;
    let (mf, mc) = block.forward(&client, &f, &c, None, Some(&mask), None)?;
    let (nf, nc) = block.forward(&client, &f, &c, None, None, None)?;

    assert_close(&mf.tensor().to_vec::<f32>(), &nf.tensor().to_vec::<f32>(), "features");
    assert_close(&mc.tensor().to_vec::<f32>(), &nc.tensor().to_vec::<f32>(), "coordinates");
    Ok(())
}

#[test]
fn test_mask_is_per_batch_element() -> TestResult {
    let (client, device) = setup();
    let block = EquivariantAttention::<CpuRuntime>::from_config(&config(0), &device)?;
    let (feats, coors) = padded_inputs();

    // same graph twice; only the second copy masks its last node
    let feats2 = [feats.clone(), feats.clone()].concat();
    let coors2 = [coors.clone(), coors.clone()].concat();
    let mask = node_mask_from_bools::<CpuRuntime>(
        &[true, true, true, true, true, true, true, false],
        2,
        4,
        &device,
    )?;
    let (_, dc) = block.forward(
        &client,
        &var(&feats2, &[2, 4, D], &device),
        &var(&coors2, &[2, 4, 3], &device),
        None,
        Some(&mask),
        None,
    )?;
    let dc: Vec<f32> = dc.tensor().to_vec();

    let (_, single) = block.forward(
        &client,
        &var(&feats, &[1, 4, D], &device),
        &var(&coors, &[1, 4, 3], &device),
        None,
        None,
        None,
    )?;
    assert_close(&dc[..12], &single.tensor().to_vec::<f32>(), "unmasked batch element");
    assert_eq!(&dc[21..], &[0.0, 0.0, 0.0]);
    Ok(())
}
