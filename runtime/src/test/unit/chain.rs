use test_case::test_case;

use crate::chain::ChainValidator;
use crate::error::Error;
use crate::operator::OperatorKind::{self, Activation, Bias, Convolution};

#[test_case(&[Convolution]; "conv")]
#[test_case(&[Convolution, Bias]; "conv_bias")]
#[test_case(&[Convolution, Activation]; "conv_activ")]
#[test_case(&[Convolution, Bias, Activation]; "conv_bias_activ")]
#[test_case(&[Bias, Activation]; "bias_activ")]
#[test_case(&[Activation]; "activ")]
fn test_fusion_table_accepts(kinds: &[OperatorKind]) {
    let mut validator = ChainValidator::fusion();
    for &kind in kinds {
        validator.advance(kind).unwrap();
    }
    assert_eq!(validator.matched_prefix(), kinds);
}

#[test_case(&[Activation], Convolution, 1; "activ_then_conv")]
#[test_case(&[Convolution, Activation], Bias, 2; "activ_then_bias")]
#[test_case(&[Convolution], Convolution, 1; "conv_twice")]
#[test_case(&[Convolution, Bias, Activation], Activation, 3; "past_the_end")]
fn test_fusion_table_rejects(prefix: &[OperatorKind], next: OperatorKind, index: usize) {
    let mut validator = ChainValidator::fusion();
    for &kind in prefix {
        validator.advance(kind).unwrap();
    }

    let err = validator.advance(next).unwrap_err();
    let Error::UnsupportedChain { kind, index: at, matched } = err else {
        panic!("expected an unsupported chain, got {err:?}");
    };
    assert_eq!((kind, at, matched.as_slice()), (next, index, prefix));
}

#[test]
fn test_failed_advance_keeps_state() {
    let mut validator = ChainValidator::fusion();
    validator.advance(Convolution).unwrap();
    validator.advance(Activation).unwrap();
    assert!(validator.advance(Bias).is_err());
    assert_eq!(validator.matched_prefix(), &[Convolution, Activation]);
    assert!(validator.is_complete());
}

#[test]
fn test_longest_prefix_survives_mismatch() {
    let mut validator =
        ChainValidator::new([vec![Convolution], vec![Convolution, Bias], vec![Convolution, Bias, Activation]]);
    validator.advance(Convolution).unwrap();
    validator.advance(Bias).unwrap();

    let err = validator.advance(Convolution).unwrap_err();
    assert!(matches!(err, Error::UnsupportedChain { kind: Convolution, index: 2, .. }));
    assert_eq!(validator.matched_prefix(), &[Convolution, Bias]);

    validator.advance(Activation).unwrap();
    assert!(validator.is_complete());
}

#[test]
fn test_completion_tracks_row_ends() {
    let mut validator = ChainValidator::new([vec![Convolution, Bias], vec![Activation]]);
    assert!(!validator.is_complete());
    validator.advance(Convolution).unwrap();
    assert!(!validator.is_complete());
    validator.advance(Bias).unwrap();
    assert!(validator.is_complete());
}

#[test]
fn test_reset_restores_every_row() {
    let mut validator = ChainValidator::new([vec![Convolution], vec![Activation]]);
    validator.advance(Convolution).unwrap();
    assert!(validator.advance(Activation).is_err());

    validator.reset();
    assert!(validator.matched_prefix().is_empty());
    validator.advance(Activation).unwrap();
    assert_eq!(validator.rows().count(), 2);
}
