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

/// Where assertions are exchanged for tokens, unless configured otherwise.
pub(crate) const DEFAULT_ENDPOINT: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";
/// The `aud` claim of the assertion, unless configured otherwise.
pub(crate) const DEFAULT_AUDIENCE: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";
/// Requested assertion lifetime, unless configured otherwise.
pub(crate) const DEFAULT_TOKEN_TTL: std::time::Duration = std::time::Duration::from_secs(3600);
