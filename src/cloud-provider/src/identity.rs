// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::build_errors::Error;
use crate::config::ConfigFile;

/// The project and zone used by the cloud provider. Both are non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub project_id: String,
    pub zone: String,
}

/// Uses the project and zone from `config`, falling back to the metadata
/// server for any value that is not configured.
///
/// Metadata failures are returned immediately, without retries.
pub(crate) async fn resolve_identity(
    config: Option<&ConfigFile>,
    metadata: &crate::mds::Client,
) -> Result<ResolvedIdentity, Error> {
    let global = config.map(|c| &c.global);

    let zone = match global.map(|g| g.zone.as_str()).filter(|z| !z.is_empty()) {
        Some(zone) => zone.to_string(),
        None => {
            let zone = metadata.zone().await.map_err(Error::zone_undiscoverable)?;
            tracing::info!("using zone {zone} from the metadata server");
            zone
        }
    };

    let project_id = match global.map(|g| g.project_id.as_str()).filter(|p| !p.is_empty()) {
        Some(project) => project.to_string(),
        None => {
            let project = metadata
                .project_id()
                .await
                .map_err(Error::project_undiscoverable)?;
            if project.is_empty() {
                return Err(Error::project_undiscoverable(
                    "the metadata server returned an empty project id",
                ));
            }
            tracing::info!("using project {project} from the metadata server");
            project
        }
    };

    Ok(ResolvedIdentity { project_id, zone })
}
