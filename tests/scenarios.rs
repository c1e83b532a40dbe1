use brickflow::ml::metric::Accuracy;
use brickflow::ml::ops::{relu, MeanSquaredError, ModuleOp, Scale};
use brickflow::ml::computation::Computation;
use brickflow::{Brick, BrickError, Collection, Inputs, NamedValues, Stage, Value};
use burn::backend::NdArray;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{Int, Tensor};

type TB = NdArray;

fn device() -> <TB as burn::tensor::backend::Backend>::Device {
    Default::default()
}

fn projection(d_in: usize, d_out: usize) -> Brick<TB> {
    let linear = LinearConfig::new(d_in, d_out).init::<TB>(&device());
    let op = ModuleOp::new(linear, |linear: &Linear<TB>, inputs: Inputs<TB>| {
        let x: Tensor<TB, 4> = inputs.get(0)?;
        Ok(vec![linear.forward(x.flatten::<2>(1, 3)).into()])
    });
    Brick::trainable(op, ["processed"], ["y"])
}

#[test]
fn scenario_a_frozen_then_trainable() {
    let mut collection = Collection::new()
        .with("normalize", Brick::frozen(Scale::new(0.5), ["raw"], ["processed"]))
        .and_then(|c| c.with("project", projection(3 * 10 * 10, 5)))
        .unwrap();

    let raw = Tensor::<TB, 4>::ones([1, 3, 10, 10], &device());
    let out = collection.invoke(NamedValues::new().with("raw", raw), Stage::Inference).unwrap();

    assert_eq!(out.keys().collect::<Vec<_>>(), vec!["processed", "raw", "y"]);
    assert_eq!(out.get("y").unwrap().dims(), vec![1, 5]);
}

#[test]
fn scenario_b_loss_alive_only_in_train() {
    let mut collection = Collection::new()
        .with("act", Brick::frozen(relu(), ["x"], ["pred"]))
        .and_then(|c| {
            c.with("mse", Brick::loss(MeanSquaredError, ["pred", "targets"], ["mse"]).alive(Stage::Train))
        })
        .unwrap();

    let x = Tensor::<TB, 2>::from_floats([[-1.0, 2.0], [0.5, 3.0]], &device());
    let targets = Tensor::<TB, 2>::from_floats([[0.0, 1.0], [1.0, 1.0]], &device());

    let inference = collection
        .step(NamedValues::new().with("x", x.clone()), Stage::Inference)
        .unwrap();
    assert!(!inference.values.contains("mse"));
    assert!(inference.losses.is_empty());
    assert!(inference.loss.is_none());

    let train = collection
        .step(NamedValues::new().with("x", x.clone()).with("targets", targets.clone()), Stage::Train)
        .unwrap();
    let loss = train.losses.get("mse").unwrap().to_f32_vec().unwrap();

    let pred: Value<TB> = burn::tensor::activation::relu(x).into();
    let direct = MeanSquaredError
        .forward(Inputs::positional(vec![
            ("pred".to_string(), pred),
            ("targets".to_string(), targets.into()),
        ]))
        .unwrap();
    assert_eq!(loss, direct[0].to_f32_vec().unwrap());
}

#[test]
fn scenario_c_metric_accumulates_across_batches() {
    let batches: [(Vec<[f32; 2]>, Vec<i64>); 3] = [
        (vec![[2.0, 0.0], [0.0, 1.0]], vec![0, 0]),
        (vec![[0.0, 3.0], [1.0, 0.0], [0.0, 1.0]], vec![1, 0, 0]),
        (vec![[5.0, 1.0]], vec![1]),
    ];
    let to_inputs = |rows: &[[f32; 2]], labels: &[i64]| {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        NamedValues::<TB>::new()
            .with("logits", Tensor::<TB, 1>::from_floats(flat.as_slice(), &device()).reshape([rows.len(), 2]))
            .with("targets", Tensor::<TB, 1, Int>::from_ints(labels, &device()))
    };
    let metric = || {
        Collection::<TB>::new()
            .with("accuracy", Brick::metric(Accuracy::new(), ["logits", "targets"]))
            .unwrap()
    };

    let mut accumulated = metric();
    for (rows, labels) in &batches {
        accumulated.invoke(to_inputs(rows, labels), Stage::Train).unwrap();
    }
    let summary = accumulated.summarize(Stage::Train, true).unwrap();

    let all_rows: Vec<[f32; 2]> = batches.iter().flat_map(|(r, _)| r.clone()).collect();
    let all_labels: Vec<i64> = batches.iter().flat_map(|(_, l)| l.clone()).collect();
    let mut one_shot = metric();
    one_shot.invoke(to_inputs(&all_rows, &all_labels), Stage::Train).unwrap();
    let expected = one_shot.summarize(Stage::Train, true).unwrap();

    assert_eq!(summary, expected);
    assert!((summary["accuracy"] - 3.0 / 6.0).abs() < 1e-12);
    assert!(accumulated.summarize(Stage::Train, false).unwrap().is_empty());
}

fn unit_a() -> Brick<TB> {
    Brick::frozen(Scale::new(-2.0), ["x"], ["a"])
}

fn unit_b() -> Brick<TB> {
    Brick::frozen(relu(), ["a"], ["b"])
}

#[test]
fn scenario_d_nesting_does_not_change_data_flow() {
    let inputs = || NamedValues::new().with("x", Tensor::<TB, 1>::from_floats([1.0, -3.0, 0.5], &device()));

    let mut flat = Collection::new()
        .with("inner_a", unit_a())
        .and_then(|c| c.with("inner_b", unit_b()))
        .unwrap();
    let inner = Collection::new()
        .with("inner_a", unit_a())
        .and_then(|c| c.with("inner_b", unit_b()))
        .unwrap();
    let mut nested = Collection::new().with("outer", inner).unwrap();

    let a = flat.invoke(inputs(), Stage::Inference).unwrap();
    let b = nested.invoke(inputs(), Stage::Inference).unwrap();

    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for key in a.keys() {
        assert_eq!(a.get(key).unwrap().to_f32_vec().unwrap(), b.get(key).unwrap().to_f32_vec().unwrap());
    }
    assert_eq!(nested.names().collect::<Vec<_>>(), vec!["outer.inner_a", "outer.inner_b"]);
}

#[test]
fn declaration_order_is_a_contract() {
    let mut collection = Collection::new()
        .with("inner_b", unit_b())
        .and_then(|c| c.with("inner_a", unit_a()))
        .unwrap();
    let inputs = NamedValues::new().with("x", Tensor::<TB, 1>::zeros([2], &device()));
    match collection.invoke(inputs, Stage::Inference) {
        Err(BrickError::MissingInput { unit, key, stage }) => {
            assert_eq!((unit.as_str(), key.as_str(), stage), ("inner_b", "a", Stage::Inference));
        }
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

#[test]
fn unknown_stage_names_are_rejected() {
    assert!("training".parse::<Stage>().is_err());
    assert_eq!("VAL".parse::<Stage>().unwrap(), Stage::Validation);
}
