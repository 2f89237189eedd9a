/// Error code registry for chunkloop
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Invalid loop input
/// - 3000-3999: Scope capture errors
/// - 4000-4999: Package resolution errors
/// - 5000-5999: Worker process errors
/// - 6000-6999: Expression evaluation errors
/// - 7000-7999: Payload (serialization boundary) errors
/// - 8000-8999: Accumulator state errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;
    pub const CONFIG_INVALID_CHUNK_SIZE: u16 = 1004;

    // Invalid input errors (2000-2999)
    pub const INPUT_GENERIC: u16 = 2000;
    pub const INPUT_PARSE_ERROR: u16 = 2001;
    pub const INPUT_INVALID_ITERATOR: u16 = 2002;
    pub const INPUT_DUPLICATE_ITERATOR: u16 = 2003;
    pub const INPUT_UNSUPPORTED_OPTION: u16 = 2004;
    pub const INPUT_INVALID_JSON: u16 = 2005;
    pub const INPUT_INVALID_YAML: u16 = 2006;

    // Scope capture errors (3000-3999)
    pub const CAPTURE_GENERIC: u16 = 3000;
    pub const CAPTURE_UNRESOLVED_EXPORT: u16 = 3001;
    pub const CAPTURE_UNRESOLVED_VARIABLE: u16 = 3002;

    // Package errors (4000-4999)
    pub const PACKAGE_GENERIC: u16 = 4000;
    pub const PACKAGE_NOT_FOUND: u16 = 4001;
    pub const PACKAGE_FUNCTION_NOT_FOUND: u16 = 4002;

    // Worker errors (5000-5999)
    pub const WORKER_GENERIC: u16 = 5000;
    pub const WORKER_SPAWN_FAILED: u16 = 5001;
    pub const WORKER_EXIT: u16 = 5002;
    pub const WORKER_SIGNAL: u16 = 5003;
    pub const WORKER_TIMEOUT: u16 = 5004;
    pub const WORKER_IO: u16 = 5005;
    pub const WORKER_CANCELLED: u16 = 5006;
    pub const WORKER_PANICKED: u16 = 5007;

    // Evaluation errors (6000-6999)
    pub const EVAL_GENERIC: u16 = 6000;
    pub const EVAL_UNBOUND_VARIABLE: u16 = 6001;
    pub const EVAL_TYPE_MISMATCH: u16 = 6002;
    pub const EVAL_ARITY: u16 = 6003;
    pub const EVAL_DIVIDE_BY_ZERO: u16 = 6004;
    pub const EVAL_INDEX_OUT_OF_RANGE: u16 = 6005;
    pub const EVAL_NON_DATA_RESULT: u16 = 6006;
    pub const EVAL_USER_FAILURE: u16 = 6007;
    pub const EVAL_RECURSION_LIMIT: u16 = 6008;
    pub const EVAL_SIZE_LIMIT: u16 = 6009;
    pub const EVAL_PANICKED: u16 = 6010;

    // Payload errors (7000-7999)
    pub const PAYLOAD_GENERIC: u16 = 7000;
    pub const PAYLOAD_BAD_MAGIC: u16 = 7001;
    pub const PAYLOAD_DIGEST_MISMATCH: u16 = 7002;
    pub const PAYLOAD_ENCODE_FAILED: u16 = 7003;
    pub const PAYLOAD_DECODE_FAILED: u16 = 7004;
    pub const PAYLOAD_RESULT_COUNT: u16 = 7005;

    // Accumulator state errors (8000-8999)
    pub const STATE_GENERIC: u16 = 8000;
    pub const STATE_INCOMPLETE: u16 = 8001;
    pub const STATE_OVERLAPPING_RANGE: u16 = 8002;
    pub const STATE_LENGTH_MISMATCH: u16 = 8003;
    pub const STATE_OUT_OF_BOUNDS: u16 = 8004;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1003 => "Invalid value in configuration",
        1004 => "Chunk size must be a positive integer",

        2000 => "Invalid loop specification",
        2001 => "Expression failed to parse",
        2002 => "Invalid iterator definition",
        2003 => "Duplicate iterator name",
        2004 => "Unsupported loop option",
        2005 => "Invalid JSON in loop input",
        2006 => "Invalid YAML in loop file",

        3000 => "Generic scope capture error",
        3001 => "Explicit export not found in caller scope",
        3002 => "Free variable not found in caller scope",

        4000 => "Generic package error",
        4001 => "Package not available",
        4002 => "Package does not export function",

        5000 => "Generic worker error",
        5001 => "Failed to spawn worker process",
        5002 => "Worker exited with failure",
        5003 => "Worker terminated by signal",
        5004 => "Worker timed out",
        5005 => "Worker I/O error",
        5006 => "Worker cancelled",
        5007 => "Worker task panicked",

        6000 => "Generic evaluation error",
        6001 => "Unbound variable",
        6002 => "Type mismatch",
        6003 => "Wrong number of arguments",
        6004 => "Division by zero",
        6005 => "Index out of range",
        6006 => "Result is not serializable data",
        6007 => "Expression raised a failure",
        6008 => "Recursion limit exceeded",
        6009 => "Value size limit exceeded",
        6010 => "Evaluation panicked",

        7000 => "Generic payload error",
        7001 => "Payload magic header mismatch",
        7002 => "Payload digest mismatch",
        7003 => "Payload encoding failed",
        7004 => "Payload decoding failed",
        7005 => "Worker returned wrong number of results",

        8000 => "Generic accumulator error",
        8001 => "Result requested before all iterations were folded",
        8002 => "Chunk range overlaps folded iterations",
        8003 => "Chunk result count does not match its range",
        8004 => "Chunk range exceeds iteration count",

        9000 => "Generic error",
        9004 => "Internal error",

        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_ranges() {
        assert!(ErrorCode::CONFIG_GENERIC >= 1000 && ErrorCode::CONFIG_GENERIC < 2000);
        assert!(ErrorCode::INPUT_GENERIC >= 2000 && ErrorCode::INPUT_GENERIC < 3000);
        assert!(ErrorCode::CAPTURE_GENERIC >= 3000 && ErrorCode::CAPTURE_GENERIC < 4000);
        assert!(ErrorCode::PACKAGE_GENERIC >= 4000 && ErrorCode::PACKAGE_GENERIC < 5000);
        assert!(ErrorCode::WORKER_GENERIC >= 5000 && ErrorCode::WORKER_GENERIC < 6000);
        assert!(ErrorCode::EVAL_GENERIC >= 6000 && ErrorCode::EVAL_GENERIC < 7000);
        assert!(ErrorCode::PAYLOAD_GENERIC >= 7000 && ErrorCode::PAYLOAD_GENERIC < 8000);
        assert!(ErrorCode::STATE_GENERIC >= 8000 && ErrorCode::STATE_GENERIC < 9000);
    }

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(
            describe_error_code(3001),
            "Explicit export not found in caller scope"
        );
        assert_eq!(describe_error_code(5004), "Worker timed out");
        assert_eq!(describe_error_code(65535), "Unknown error code");
    }
}
