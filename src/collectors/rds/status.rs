//! Mapping from the textual RDS instance status to the numeric enumeration
//! emitted by `rds_instance_status`. Keep the table in one place; tests pin
//! every known value.

/// Reserved code for statuses the exporter does not know about.
pub const UNKNOWN_STATUS_CODE: i64 = 0;

/// Map the textual instance status to its numeric code.
///
/// Unknown statuses map to [`UNKNOWN_STATUS_CODE`].
#[must_use]
pub fn instance_status_code(status: &str) -> i64 {
    match status {
        "available" => 1,
        "backing-up" => 2,
        "creating" => 3,
        "deleting" => 4,
        "failed" => 5,
        "maintenance" => 6,
        "modifying" => 7,
        "rebooting" => 8,
        "renaming" => 9,
        "restore-error" => 10,
        "starting" => 11,
        "stopped" => 12,
        "stopping" => 13,
        "storage-full" => 14,
        "upgrading" => 15,
        "configuring-enhanced-monitoring" => 16,
        "converting-to-vpc" => 17,
        "incompatible-network" => 18,
        "incompatible-option-group" => 19,
        "incompatible-parameters" => 20,
        "incompatible-restore" => 21,
        "storage-optimization" => 22,
        _ => UNKNOWN_STATUS_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_statuses_are_pinned() {
        let expected = [
            ("available", 1),
            ("backing-up", 2),
            ("creating", 3),
            ("deleting", 4),
            ("failed", 5),
            ("maintenance", 6),
            ("modifying", 7),
            ("rebooting", 8),
            ("renaming", 9),
            ("restore-error", 10),
            ("starting", 11),
            ("stopped", 12),
            ("stopping", 13),
            ("storage-full", 14),
            ("upgrading", 15),
            ("configuring-enhanced-monitoring", 16),
            ("converting-to-vpc", 17),
            ("incompatible-network", 18),
            ("incompatible-option-group", 19),
            ("incompatible-parameters", 20),
            ("incompatible-restore", 21),
            ("storage-optimization", 22),
        ];

        for (status, code) in expected {
            assert_eq!(
                instance_status_code(status),
                code,
                "status '{status}' should map to {code}"
            );
        }
    }

    #[test]
    fn test_unknown_status_maps_to_reserved_value() {
        assert_eq!(instance_status_code("not-a-status"), UNKNOWN_STATUS_CODE);
        assert_eq!(instance_status_code(""), UNKNOWN_STATUS_CODE);
    }
}
