use brickflow::application::export_use_case::{ExportConfig, ExportUseCase};
use brickflow::application::train_use_case::{TrainConfig, TrainUseCase};
use brickflow::export::onnx::ModelProto;
use brickflow::infra::checkpoint::CheckpointManager;
use brickflow::Stage;
use prost::Message;

fn config(dir: &std::path::Path) -> TrainConfig {
    TrainConfig {
        checkpoint_dir: dir.to_string_lossy().into_owned(),
        num_samples:    96,
        num_classes:    3,
        channels:       1,
        height:         4,
        width:          4,
        hidden:         8,
        noise:          0.1,
        batch_size:     16,
        epochs:         4,
        lr:             1e-2,
        train_fraction: 0.75,
        seed:           7,
    }
}

#[test]
fn train_checkpoint_and_export() {
    let tmp = tempfile::tempdir().unwrap();
    let reports = TrainUseCase::new(config(tmp.path())).execute().unwrap();

    assert_eq!(reports.len(), 4);
    let first = reports[0].train.loss.unwrap();
    let last = reports[3].train.loss.unwrap();
    assert!(last < first, "training loss went from {first} to {last}");
    assert!(reports[3].valid.metrics.contains_key("accuracy"));

    let csv = std::fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
    assert!(csv.starts_with("epoch,stage,name,value"));
    assert!(csv.contains("4,validation,accuracy,"));

    let manifest = CheckpointManager::new(tmp.path()).unwrap().manifest().unwrap();
    assert_eq!(manifest.epoch, 4);

    let output = tmp.path().join("model.onnx");
    let epoch = ExportUseCase::new(ExportConfig {
        checkpoint_dir: config(tmp.path()).checkpoint_dir,
        output:         output.clone(),
        dynamic_batch:  true,
        batch_size:     2,
        stage:          Stage::Export,
    })
    .execute()
    .unwrap();
    assert_eq!(epoch, 4);

    let model = ModelProto::decode(std::fs::read(&output).unwrap().as_slice()).unwrap();
    let graph = model.graph.unwrap();
    let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
    assert_eq!(ops, vec!["Mul", "Flatten", "MatMul", "Add", "Relu", "MatMul", "Add", "Softmax"]);
    assert_eq!(graph.input[0].name, "images");
    assert_eq!(graph.output[0].name, "probabilities");
    assert_eq!(graph.output[0].shape().unwrap().1, vec![None, Some(3)]);
}
