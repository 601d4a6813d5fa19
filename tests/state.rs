use rusty_fuser::nn::{Module, StateDict};
use rusty_fuser::{ConvFuser, Error, Fuser, Tensor};
use std::fs::File;
use std::io::{BufReader, BufWriter};

fn values(t: &Tensor) -> Vec<f32> {
    t.data().iter().copied().collect()
}

#[test]
fn state_dict_follows_pipeline_layout() {
    let fuser = ConvFuser::new(vec![4, 8], 16).unwrap();
    let keys: Vec<String> = fuser.transform().state_dict().into_keys().collect();
    assert_eq!(
        keys,
        vec![
            "0.weight",
            "1.bias",
            "1.num_batches_tracked",
            "1.running_mean",
            "1.running_var",
            "1.weight",
        ]
    );
}

#[test]
fn checkpoint_round_trip_restores_eval_behaviour() {
    let trained = ConvFuser::new(vec![3, 5], 4).unwrap();
    let inputs = [Tensor::rand(vec![2, 3, 4, 4]), Tensor::rand(vec![2, 5, 8, 8])];
    // One training pass moves the running statistics away from their defaults.
    trained.fuse(&inputs).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fuser.bin");
    bincode::serialize_into(
        BufWriter::new(File::create(&path).unwrap()),
        &trained.transform().state_dict(),
    )
    .unwrap();

    let restored = ConvFuser::new(vec![3, 5], 4).unwrap();
    let state: StateDict = bincode::deserialize_from(BufReader::new(File::open(&path).unwrap())).unwrap();
    restored.transform().load_state_dict(&state).unwrap();

    trained.transform().train(false);
    restored.transform().train(false);
    assert_eq!(
        values(&trained.fuse(&inputs).unwrap()),
        values(&restored.fuse(&inputs).unwrap())
    );
}

#[test]
fn loading_rejects_missing_and_misshapen_entries() {
    let fuser = ConvFuser::new(vec![4, 8], 16).unwrap();

    let mut missing = fuser.transform().state_dict();
    missing.remove("1.running_var");
    assert!(matches!(
        fuser.transform().load_state_dict(&missing),
        Err(Error::MissingState(name)) if name == "1.running_var"
    ));

    let other = ConvFuser::new(vec![4, 4], 16).unwrap();
    assert!(matches!(
        fuser.transform().load_state_dict(&other.transform().state_dict()),
        Err(Error::StateShape { name, .. }) if name == "0.weight"
    ));
}

#[test]
fn failed_load_leaves_parameters_untouched() {
    let fuser = ConvFuser::new(vec![2, 2], 3).unwrap();
    let before = fuser.transform().state_dict();

    let mut partial = ConvFuser::new(vec![2, 2], 3).unwrap().transform().state_dict();
    partial.remove("1.bias");
    assert!(fuser.transform().load_state_dict(&partial).is_err());
    assert_eq!(fuser.transform().state_dict(), before);
}
