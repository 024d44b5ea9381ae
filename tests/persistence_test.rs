//! Save/load reproduction tests.
//!
//! A persisted model reloaded into an identically constructed stack must
//! reproduce the original stack's predictions exactly: the weight table,
//! the clamp range, and the layer blocks all round-trip through the file
//! format.

use caudal::model::{load_model, save_model, load_model_bytes, save_model_bytes};
use caudal::prelude::*;

fn simple_example(label: f32, index: u32, value: f32) -> Example {
    let mut ec = Example::new();
    ec.push_feature(b'a', Feature::new(value, index));
    ec.push_constant();
    ec.label = Label::Simple(SimpleLabel::new(label));
    ec
}

fn class_example(class: u32, index: u32) -> Example {
    let mut ec = Example::new();
    ec.push_feature(b'a', Feature::new(1.0, index));
    ec.push_constant();
    ec.label = Label::Multiclass { class, weight: 1.0 };
    ec
}

fn unlabeled(index: u32, value: f32) -> Example {
    let mut ec = Example::new();
    ec.push_feature(b'a', Feature::new(value, index));
    ec.push_constant();
    ec
}

#[test]
fn test_regressor_roundtrip_reproduces_predictions() {
    let mut config = Config::new().with_bits(14).with_pair("aa");
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();

    for i in 0..50u32 {
        let label = if i % 2 == 0 { 2.0 } else { -1.0 };
        let mut ec = simple_example(label, 100 + i % 2, 1.0);
        stack.learn(&mut ws, &mut ec, 0);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.cdl");
    save_model(&path, &mut ws, stack.as_mut(), false).unwrap();

    let mut fresh_ws = Workspace::new(&config).unwrap();
    let mut fresh_stack = build_stack(&config).unwrap();
    load_model(&path, &mut fresh_ws, fresh_stack.as_mut()).unwrap();

    for i in 0..4u32 {
        let mut a = unlabeled(100 + i % 2, 1.5);
        let mut b = unlabeled(100 + i % 2, 1.5);
        stack.predict(&mut ws, &mut a, 0);
        fresh_stack.predict(&mut fresh_ws, &mut b, 0);
        assert_eq!(a.pred.scalar(), b.pred.scalar(), "example {i}");
    }
}

#[test]
fn test_oaa_stack_roundtrip_reproduces_classes() {
    let mut config = Config::new().with_bits(14).with_oaa(3);
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();

    for _ in 0..30 {
        for (class, index) in [(1u32, 10u32), (2, 20), (3, 30)] {
            let mut ec = class_example(class, index);
            stack.learn(&mut ws, &mut ec, 0);
        }
    }

    let bytes = save_model_bytes(&mut ws, stack.as_mut(), false).unwrap();
    let mut fresh_ws = Workspace::new(&config).unwrap();
    let mut fresh_stack = build_stack(&config).unwrap();
    load_model_bytes(&bytes, &mut fresh_ws, fresh_stack.as_mut()).unwrap();

    for index in [10u32, 20, 30] {
        let mut a = class_example(0, index);
        let mut b = class_example(0, index);
        stack.predict(&mut ws, &mut a, 0);
        fresh_stack.predict(&mut fresh_ws, &mut b, 0);
        assert_eq!(a.pred.multiclass(), b.pred.multiclass(), "index {index}");
        assert!(a.pred.multiclass() >= 1);
    }
}

#[test]
fn test_nn_stack_roundtrip_reproduces_predictions() {
    let mut config = Config::new().with_bits(14).with_nn(3).with_seed(7);
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();

    for i in 0..40u32 {
        let label = if i % 2 == 0 { 1.0 } else { -1.0 };
        let mut ec = simple_example(label, 50 + i % 2, 1.0);
        stack.learn(&mut ws, &mut ec, 0);
    }

    let bytes = save_model_bytes(&mut ws, stack.as_mut(), false).unwrap();
    let mut fresh_ws = Workspace::new(&config).unwrap();
    let mut fresh_stack = build_stack(&config).unwrap();
    load_model_bytes(&bytes, &mut fresh_ws, fresh_stack.as_mut()).unwrap();

    for index in [50u32, 51] {
        let mut a = unlabeled(index, 1.0);
        let mut b = unlabeled(index, 1.0);
        stack.predict(&mut ws, &mut a, 0);
        fresh_stack.predict(&mut fresh_ws, &mut b, 0);
        assert_eq!(a.pred.scalar(), b.pred.scalar(), "index {index}");
    }
}

#[test]
fn test_text_format_roundtrip() {
    let mut config = Config::new().with_bits(10);
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();
    let mut ec = simple_example(1.0, 5, 1.0);
    stack.learn(&mut ws, &mut ec, 0);

    let bytes = save_model_bytes(&mut ws, stack.as_mut(), true).unwrap();
    let mut fresh_ws = Workspace::new(&config).unwrap();
    let mut fresh_stack = build_stack(&config).unwrap();
    load_model_bytes(&bytes, &mut fresh_ws, fresh_stack.as_mut()).unwrap();

    let mut a = unlabeled(5, 1.0);
    let mut b = unlabeled(5, 1.0);
    stack.predict(&mut ws, &mut a, 0);
    fresh_stack.predict(&mut fresh_ws, &mut b, 0);
    assert_eq!(a.pred.scalar(), b.pred.scalar());
}

#[test]
fn test_geometry_mismatch_rejected() {
    let mut config = Config::new().with_bits(12);
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();
    let bytes = save_model_bytes(&mut ws, stack.as_mut(), false).unwrap();

    let mut other = Config::new().with_bits(13);
    other.quiet = true;
    let mut other_ws = Workspace::new(&other).unwrap();
    let mut other_stack = build_stack(&other).unwrap();
    let err = load_model_bytes(&bytes, &mut other_ws, other_stack.as_mut()).unwrap_err();
    assert!(err.to_string().contains("num_bits"), "{err}");
}

#[test]
fn test_corrupted_model_rejected() {
    let mut config = Config::new().with_bits(10);
    config.quiet = true;
    let mut ws = Workspace::new(&config).unwrap();
    let mut stack = build_stack(&config).unwrap();
    let mut ec = simple_example(1.0, 5, 1.0);
    stack.learn(&mut ws, &mut ec, 0);

    let mut bytes = save_model_bytes(&mut ws, stack.as_mut(), false).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    let err = load_model_bytes(&bytes, &mut ws, stack.as_mut()).unwrap_err();
    assert!(
        matches!(err, CaudalError::ChecksumMismatch { .. })
            || matches!(err, CaudalError::FormatError { .. }),
        "{err}"
    );
}
