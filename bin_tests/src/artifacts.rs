// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{ArtifactType, ArtifactsBuild, BuildProfile};

/// Creates an ArtifactsBuild for the session_log_bin_test binary.
pub fn session_log_bin_test(profile: BuildProfile) -> ArtifactsBuild {
    ArtifactsBuild {
        name: "session_log_bin_test".to_owned(),
        build_profile: profile,
        artifact_type: ArtifactType::Bin,
    }
}
