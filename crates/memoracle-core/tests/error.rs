//! Tests for error handling

use memoracle_core::error::{OracleError, OracleResult};
use memoracle_core::types::{Address, FrameId, Kind};

#[test]
fn test_resolution_display()
{
    let error = OracleError::resolution("(*p).next", "there is no member named next");
    let message = format!("{}", error);
    assert!(message.contains("(*p).next"));
    assert!(message.contains("no member"));
}

#[test]
fn test_memory_error_display()
{
    let error = OracleError::Memory {
        address: Address::new(0xdead_0000),
    };
    assert_eq!(error.to_string(), "Cannot access memory at address 0xdead0000");
}

#[test]
fn test_duplicate_address_display()
{
    let error = OracleError::DuplicateAddress {
        address: Address::new(0x10),
        kind: Kind::Primitive,
        existing: "int".to_string(),
        incoming: "double".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("0x10"));
    assert!(message.contains("primitive"));
    assert!(message.contains("`int`"));
    assert!(message.contains("`double`"));
}

#[test]
fn test_only_ambiguous_parent_is_fatal()
{
    let fatal = OracleError::AmbiguousParent { name: "x".to_string() };
    assert!(!fatal.is_recoverable());

    let recoverable = [
        OracleError::resolution("x", "gone"),
        OracleError::Memory { address: Address::ZERO },
        OracleError::StaleFrame(FrameId::from_raw(1)),
        OracleError::NotFound {
            kind: Kind::Struct,
            address: Address::new(0x20),
        },
        OracleError::ResourceExhausted("no slots".to_string()),
        OracleError::InvalidArgument("bad".to_string()),
    ];
    assert!(recoverable.iter().all(OracleError::is_recoverable));
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "fixture.json");
    let error: OracleError = io.into();
    match error {
        OracleError::Io(_) => {}
        other => panic!("Expected Io variant, got {other:?}"),
    }
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: OracleResult<()> = Ok(());
    let _error_result: OracleResult<()> = Err(OracleError::InvalidArgument("test arg".to_string()));
}
