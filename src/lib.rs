// Copyright (c) 2026 contributors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod bus;
pub mod common;
pub mod configs;
pub mod dacp;
pub mod delivery;
pub mod group;
pub mod http_stream;
pub mod loudness;
pub mod mixer;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod raop;
pub mod server;
