// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
//
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

//! Compute API over HTTP: key pairs plus nova-network security groups and
//! floating IPs.

use std::time::Duration;

use serde_json::json;
use waiter::Waiter;

use super::protocol::*;
use super::rest::RestClient;
use super::waiter::DeletionWaiter;
use super::{FloatingIpsApi, KeyPairsApi, SecurityGroupsApi};
use crate::Result;

/// Compute service client.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    rest: RestClient,
    wait_timeout: Duration,
    delay: Duration,
}

impl ComputeClient {
    /// Create a client.
    pub fn new(rest: RestClient, wait_timeout: Duration, delay: Duration) -> ComputeClient {
        ComputeClient {
            rest,
            wait_timeout,
            delay,
        }
    }
}

impl KeyPairsApi for ComputeClient {
    fn create_keypair(&self, name: &str) -> Result<KeyPair> {
        debug!("Creating a key pair {}", name);
        let root: KeyPairRoot = self
            .rest
            .post_json("os-keypairs", json!({"keypair": {"name": name}}))?;
        debug!(
            "Created key pair {} with fingerprint {}",
            root.keypair.name, root.keypair.fingerprint
        );
        Ok(root.keypair)
    }

    fn delete_keypair(&self, name: &str) -> Result<()> {
        debug!("Deleting key pair {}", name);
        self.rest.delete(&format!("os-keypairs/{}", name))?;
        debug!("Key pair {} was deleted", name);
        Ok(())
    }
}

impl SecurityGroupsApi for ComputeClient {
    fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        debug!("Creating a new security group {}", name);
        let root: SecurityGroupRoot = self.rest.post_json(
            "os-security-groups",
            json!({"security_group": {"name": name, "description": description}}),
        )?;
        debug!("Created security group {:?}", root.security_group);
        Ok(root.security_group)
    }

    fn delete_security_group(&self, id: &str) -> Result<()> {
        debug!("Deleting security group {}", id);
        self.rest.delete(&format!("os-security-groups/{}", id))?;
        debug!("Security group {} was deleted", id);
        Ok(())
    }

    fn show_security_group(&self, id: &str) -> Result<SecurityGroup> {
        trace!("Get security group by ID {}", id);
        let root: SecurityGroupRoot = self
            .rest
            .get_json(&format!("os-security-groups/{}", id), &[])?;
        trace!("Received {:?}", root.security_group);
        Ok(root.security_group)
    }

    fn list_security_groups(
        &self,
        project_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<SecurityGroup>> {
        let query: Vec<(&str, &str)> = project_id
            .into_iter()
            .map(|p| ("tenant_id", p))
            .chain(project_id.map(|_| ("all_tenants", "1")))
            .collect();
        trace!("Listing security groups with {:?}", query);
        let root: SecurityGroupsRoot = self.rest.get_json("os-security-groups", &query)?;
        // nova-network does not filter by name on the server side
        Ok(root
            .security_groups
            .into_iter()
            .filter(|sg| name.map_or(true, |n| sg.name == n))
            .collect())
    }

    fn create_security_group_rule(
        &self,
        request: &NewSecurityGroupRule,
    ) -> Result<SecurityGroupRule> {
        debug!("Creating a new security group rule with {:?}", request);
        let (from_port, to_port) = match (request.port_range_min, request.port_range_max) {
            (Some(min), Some(max)) => (min, max),
            _ => (-1, -1),
        };
        let root: SecurityGroupRuleRoot = self.rest.post_json(
            "os-security-group-rules",
            json!({"security_group_rule": {
                "parent_group_id": request.security_group_id,
                "ip_protocol": request.protocol,
                "from_port": from_port,
                "to_port": to_port,
                "cidr": "0.0.0.0/0",
            }}),
        )?;
        debug!("Created security group rule {:?}", root.rule);
        Ok(root.rule)
    }

    fn wait_for_security_group_deletion(&self, id: &str) -> Result<()> {
        DeletionWaiter::new(
            format!("security group {}", id),
            || self.show_security_group(id).map(|_| ()),
            self.wait_timeout,
            self.delay,
        )
        .wait()
    }
}

impl FloatingIpsApi for ComputeClient {
    fn create_floating_ip(&self, network: &str) -> Result<FloatingIp> {
        debug!("Creating a new floating IP from pool {}", network);
        let root: FloatingIpRoot = self
            .rest
            .post_json("os-floating-ips", json!({ "pool": network }))?;
        debug!("Created floating IP {:?}", root.floatingip);
        Ok(root.floatingip)
    }

    fn delete_floating_ip(&self, id: &str) -> Result<()> {
        debug!("Deleting floating IP {}", id);
        self.rest.delete(&format!("os-floating-ips/{}", id))?;
        debug!("Floating IP {} was deleted", id);
        Ok(())
    }
}
