use std::io::Cursor;

use approx::assert_relative_eq;
use brickflow::export::{export_onnx, ExportOptions};
use brickflow::ml::model::{ClassifierConfig, IMAGES, PROBABILITIES};
use brickflow::{NamedValues, Stage};
use burn::backend::NdArray;
use burn::tensor::Tensor as BurnTensor;
use tract_onnx::prelude::*;

type TB = NdArray;

fn pixels(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i * 7) % 11) as f32 / 11.0 - 0.3).collect()
}

fn run_tract(bytes: Vec<u8>, shape: [usize; 4], data: Vec<f32>) -> Vec<f32> {
    let model = tract_onnx::onnx()
        .model_for_read(&mut Cursor::new(bytes))
        .unwrap()
        .into_optimized()
        .unwrap()
        .into_runnable()
        .unwrap();
    let input: Tensor = tract_ndarray::Array4::from_shape_vec(
        (shape[0], shape[1], shape[2], shape[3]),
        data,
    )
    .unwrap()
    .into();
    let result = model.run(tvec!(input.into())).unwrap();
    result[0].to_array_view::<f32>().unwrap().iter().copied().collect()
}

#[test]
fn exported_classifier_matches_invoke() {
    let device = Default::default();
    let mut collection = ClassifierConfig::new(2, 3, 3, 4)
        .with_hidden(6)
        .with_input_scale(0.5)
        .build::<TB>(&device)
        .unwrap();

    let shape = [2, 2, 3, 3];
    let data = pixels(2 * 2 * 3 * 3);
    let images = BurnTensor::<TB, 1>::from_floats(data.as_slice(), &device).reshape(shape);
    let inputs = NamedValues::new().with(IMAGES, images);

    let bytes = export_onnx(&mut collection, &inputs, &ExportOptions::default()).unwrap();
    let expected = collection
        .invoke(inputs, Stage::Export)
        .unwrap()
        .get(PROBABILITIES)
        .unwrap()
        .to_f32_vec()
        .unwrap();

    let actual = run_tract(bytes, shape, data);
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(&expected) {
        assert_relative_eq!(*a, *e, epsilon = 1e-6, max_relative = 1e-4);
    }
}

#[test]
fn overwritten_keys_round_trip() {
    use brickflow::ml::ops::{relu, Scale};
    use brickflow::{Brick, Collection};

    let device = Default::default();
    let mut collection = Collection::<TB>::new()
        .with("scale", Brick::frozen(Scale::new(3.0), [IMAGES], ["x"]))
        .and_then(|c| c.with("act", Brick::frozen(relu(), ["x"], ["x"])))
        .and_then(|c| c.with("train_only", Brick::frozen(Scale::new(100.0), ["x"], ["x"]).alive(Stage::Train)))
        .unwrap();

    let shape = [1, 1, 2, 2];
    let data = vec![-1.0, 0.5, 2.0, -0.25];
    let images = BurnTensor::<TB, 1>::from_floats(data.as_slice(), &device).reshape(shape);
    let bytes = export_onnx(
        &mut collection,
        &NamedValues::new().with(IMAGES, images),
        &ExportOptions::default(),
    )
    .unwrap();

    let actual = run_tract(bytes, shape, data);
    assert_eq!(actual, vec![0.0, 1.5, 6.0, 0.0]);
}
