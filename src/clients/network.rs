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

//! Network API over HTTP.

use std::time::Duration;

use serde_json::json;
use waiter::Waiter;

use super::protocol::*;
use super::rest::RestClient;
use super::waiter::DeletionWaiter;
use super::{FloatingIpsApi, NetworksApi, RoutersApi, SecurityGroupsApi, SubnetsApi};
use crate::Result;

/// Network service client.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    rest: RestClient,
    wait_timeout: Duration,
    delay: Duration,
}

impl NetworkClient {
    /// Create a client.
    ///
    /// `wait_timeout` and `delay` apply to waiting for deletion.
    pub fn new(rest: RestClient, wait_timeout: Duration, delay: Duration) -> NetworkClient {
        NetworkClient {
            rest,
            wait_timeout,
            delay,
        }
    }
}

impl NetworksApi for NetworkClient {
    fn create_network(&self, request: &NewNetwork) -> Result<Network> {
        debug!("Creating a new network with {:?}", request);
        let root: NetworkRoot = self
            .rest
            .post_json("v2.0/networks", json!({ "network": request }))?;
        debug!("Created network {:?}", root.network);
        Ok(root.network)
    }

    fn delete_network(&self, id: &str) -> Result<()> {
        debug!("Deleting network {}", id);
        self.rest.delete(&format!("v2.0/networks/{}", id))?;
        debug!("Network {} was deleted", id);
        Ok(())
    }

    fn list_networks(&self) -> Result<Vec<Network>> {
        trace!("Listing networks");
        let root: NetworksRoot = self.rest.get_json("v2.0/networks", &[])?;
        trace!("Received networks: {:?}", root.networks);
        Ok(root.networks)
    }
}

impl SubnetsApi for NetworkClient {
    fn create_subnet(&self, request: &NewSubnet) -> Result<Subnet> {
        debug!("Creating a new subnet with {:?}", request);
        let root: SubnetRoot = self
            .rest
            .post_json("v2.0/subnets", json!({ "subnet": request }))?;
        debug!("Created subnet {:?}", root.subnet);
        Ok(root.subnet)
    }

    fn delete_subnet(&self, id: &str) -> Result<()> {
        debug!("Deleting subnet {}", id);
        self.rest.delete(&format!("v2.0/subnets/{}", id))?;
        debug!("Subnet {} was deleted", id);
        Ok(())
    }
}

impl RoutersApi for NetworkClient {
    fn create_router(&self, request: &NewRouter) -> Result<Router> {
        debug!("Creating a new router with {:?}", request);
        let root: RouterRoot = self
            .rest
            .post_json("v2.0/routers", json!({ "router": request }))?;
        debug!("Created router {:?}", root.router);
        Ok(root.router)
    }

    fn delete_router(&self, id: &str) -> Result<()> {
        debug!("Deleting router {}", id);
        self.rest.delete(&format!("v2.0/routers/{}", id))?;
        debug!("Router {} was deleted", id);
        Ok(())
    }

    fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        debug!("Adding subnet {} to router {}", subnet_id, router_id);
        self.rest.put(
            &format!("v2.0/routers/{}/add_router_interface", router_id),
            json!({ "subnet_id": subnet_id }),
        )
    }

    fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        debug!("Removing subnet {} from router {}", subnet_id, router_id);
        self.rest.put(
            &format!("v2.0/routers/{}/remove_router_interface", router_id),
            json!({ "subnet_id": subnet_id }),
        )
    }
}

impl SecurityGroupsApi for NetworkClient {
    fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        debug!("Creating a new security group {}", name);
        let root: SecurityGroupRoot = self.rest.post_json(
            "v2.0/security-groups",
            json!({"security_group": {"name": name, "description": description}}),
        )?;
        debug!("Created security group {:?}", root.security_group);
        Ok(root.security_group)
    }

    fn delete_security_group(&self, id: &str) -> Result<()> {
        debug!("Deleting security group {}", id);
        self.rest.delete(&format!("v2.0/security-groups/{}", id))?;
        debug!("Security group {} was deleted", id);
        Ok(())
    }

    fn show_security_group(&self, id: &str) -> Result<SecurityGroup> {
        trace!("Get security group by ID {}", id);
        let root: SecurityGroupRoot = self
            .rest
            .get_json(&format!("v2.0/security-groups/{}", id), &[])?;
        trace!("Received {:?}", root.security_group);
        Ok(root.security_group)
    }

    fn list_security_groups(
        &self,
        project_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<SecurityGroup>> {
        let mut query = Vec::with_capacity(2);
        if let Some(project_id) = project_id {
            query.push(("project_id", project_id));
        }
        if let Some(name) = name {
            query.push(("name", name));
        }
        trace!("Listing security groups with {:?}", query);
        let root: SecurityGroupsRoot = self.rest.get_json("v2.0/security-groups", &query)?;
        trace!("Received security groups: {:?}", root.security_groups);
        Ok(root.security_groups)
    }

    fn create_security_group_rule(
        &self,
        request: &NewSecurityGroupRule,
    ) -> Result<SecurityGroupRule> {
        debug!("Creating a new security group rule with {:?}", request);
        let mut rule = json!({
            "security_group_id": request.security_group_id,
            "direction": "ingress",
            "protocol": request.protocol,
            "ethertype": request.ethertype,
        });
        if let Some(min) = request.port_range_min {
            rule["port_range_min"] = json!(min);
        }
        if let Some(max) = request.port_range_max {
            rule["port_range_max"] = json!(max);
        }
        let root: SecurityGroupRuleRoot = self
            .rest
            .post_json("v2.0/security-group-rules", json!({ "security_group_rule": rule }))?;
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

impl FloatingIpsApi for NetworkClient {
    fn create_floating_ip(&self, network: &str) -> Result<FloatingIp> {
        debug!("Creating a new floating IP on network {}", network);
        let root: FloatingIpRoot = self.rest.post_json(
            "v2.0/floatingips",
            json!({"floatingip": {"floating_network_id": network}}),
        )?;
        debug!("Created floating IP {:?}", root.floatingip);
        Ok(root.floatingip)
    }

    fn delete_floating_ip(&self, id: &str) -> Result<()> {
        debug!("Deleting floating IP {}", id);
        self.rest.delete(&format!("v2.0/floatingips/{}", id))?;
        debug!("Floating IP {} was deleted", id);
        Ok(())
    }
}
