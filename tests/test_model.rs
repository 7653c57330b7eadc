use std::fs;

use beamtag::feature::{normalize, suffix, FieldRef, Term};
use beamtag::{Error, Model, Tagger, TaggerBuilder, Tagset, WeightTable};
use tempfile::NamedTempFile;

fn write_weights(weights: &[f32]) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let bytes: Vec<u8> = weights.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(file.path(), bytes).unwrap();
    file
}

#[test]
fn test_load_weights() {
    let file = write_weights(&[0.5, -1.0, 2.0, 0.0]);
    let table = WeightTable::load(file.path(), None).unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.as_slice(), &[0.5, -1.0, 2.0, 0.0]);
    // hashes index the table modulo its length
    assert_eq!(table.weight(6), 2.0);
    assert_eq!(table.score(&[0, 1, 5]), -1.5);

    let table = WeightTable::load(file.path(), Some(4)).unwrap();
    assert_eq!(table.to_bytes(), fs::read(file.path()).unwrap());
}

#[test]
fn test_load_invalid_weights() {
    let empty = write_weights(&[]);
    assert!(matches!(
        WeightTable::load(empty.path(), None),
        Err(Error::ModelLoad(_))
    ));

    let odd = write_weights(&[1.0, 2.0, 3.0]);
    assert!(matches!(
        WeightTable::load(odd.path(), None),
        Err(Error::ModelLoad(_))
    ));

    let file = write_weights(&[1.0, 2.0]);
    assert!(matches!(
        WeightTable::load(file.path(), Some(4)),
        Err(Error::ModelLoad(_))
    ));

    let misaligned = NamedTempFile::new().unwrap();
    fs::write(misaligned.path(), [0u8; 7]).unwrap();
    assert!(matches!(
        WeightTable::load(misaligned.path(), None),
        Err(Error::ModelLoad(_))
    ));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.weights");
    assert!(matches!(
        WeightTable::load(path, None),
        Err(Error::Io(_))
    ));
}

fn templates(builder: &mut TaggerBuilder) {
    let this_tag = builder.tag(1, 0).unwrap();
    let last_tag = builder.tag(1, -1).unwrap();
    let word = normalize(FieldRef::new(0, 0));
    builder
        .template([this_tag, last_tag])
        .unwrap()
        .template([Term::from(this_tag), word.clone().into()])
        .unwrap()
        .template([Term::from(this_tag), suffix(word, 2).into()])
        .unwrap();
}

#[test]
fn test_save_and_load_model() {
    let weights: Vec<f32> = (0..256).map(|i| ((i * 37) % 101) as f32 / 50.0 - 1.0).collect();
    let mut builder = Tagger::builder(Tagset::new(["DET", "NOUN", "VERB"]).unwrap());
    templates(&mut builder);
    let tagger = builder
        .build(WeightTable::from_weights(weights).unwrap())
        .unwrap();
    let sentence = ["the", "dog", "barks", "at", "the", "cat"];
    let expected = tagger.tag_tokens(&sentence).unwrap();

    let file = NamedTempFile::new().unwrap();
    tagger.save_model(file.path()).unwrap();
    let model = Model::load(file.path(), Some(256)).unwrap();
    assert_eq!(model.tagset().len(), 3);
    assert_eq!(model.weights().as_slice(), tagger.weights().as_slice());

    let (mut builder, weights) = Tagger::builder_from_model(model);
    templates(&mut builder);
    let loaded = builder.build(weights).unwrap();
    assert_eq!(loaded.tag_tokens(&sentence).unwrap(), expected);
}

#[test]
fn test_load_invalid_model() {
    // a bare weight table is not a model file
    let file = write_weights(&[0.5, -1.0, 2.0, 0.0]);
    assert!(matches!(
        Model::load(file.path(), None),
        Err(Error::ModelLoad(_))
    ));
}
