//! VPC and security group builders
//!
//! The VPC mirrors the default layout of a CDK `Vpc`: one public and one
//! private subnet per availability zone, equal-size blocks carved from the
//! VPC CIDR, an internet gateway for the public tier and NAT gateways for
//! the private tier.

use crate::error::{Result, StackError};
use crate::intrinsic::Value;
use crate::props;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use gluecat_config::{NetworkConfig, VPC_PREFIX_RANGE};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use tracing::info;

/// Smallest subnet AWS allows
const MAX_SUBNET_PREFIX: u8 = 28;

pub const ANYWHERE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    fn label(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::Private => "Private",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subnet {
    pub id: LogicalId,
    pub route_table: LogicalId,
    pub kind: SubnetKind,
    pub availability_zone: Value,
    pub cidr: Ipv4Network,
}

impl Subnet {
    pub fn subnet_id(&self) -> Value {
        self.id.reference()
    }
}

/// Immutable descriptor of the synthesized VPC
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: LogicalId,
    pub cidr: Ipv4Network,
    pub internet_gateway: LogicalId,
    pub public_subnets: Vec<Subnet>,
    pub private_subnets: Vec<Subnet>,
    pub nat_gateways: Vec<LogicalId>,
}

impl Network {
    pub fn vpc_id(&self) -> Value {
        self.vpc.reference()
    }

    pub fn private_subnet_ids(&self) -> Vec<Value> {
        self.private_subnets.iter().map(Subnet::subnet_id).collect()
    }

    /// Placement used for single-subnet attachments such as Glue connections
    pub fn first_private_subnet(&self) -> &Subnet {
        // build_vpc refuses zero AZs
        &self.private_subnets[0]
    }
}

/// Split `cidr` into `count` equal blocks (rounded up to a power of two).
pub fn carve_subnets(cidr: Ipv4Network, count: usize) -> Result<Vec<Ipv4Network>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let extra_bits = count.next_power_of_two().trailing_zeros();
    let prefix = u32::from(cidr.prefix()) + extra_bits;
    if prefix > u32::from(MAX_SUBNET_PREFIX) {
        return Err(StackError::network_layout(format!(
            "{} is too small for {} subnets (would need /{}; smallest allowed is /{})",
            cidr, count, prefix, MAX_SUBNET_PREFIX
        )));
    }

    let block = 1u32 << (32 - prefix);
    let base = u32::from(cidr.network());
    (0..count as u32)
        .map(|i| {
            Ipv4Network::new(Ipv4Addr::from(base + i * block), prefix as u8)
                .map_err(|e| StackError::network_layout(e.to_string()))
        })
        .collect()
}

pub fn build_vpc(stack: &mut Stack, config: &NetworkConfig) -> Result<Network> {
    let cidr: Ipv4Network = config
        .cidr
        .parse()
        .map_err(|e| StackError::network_layout(format!("invalid VPC CIDR {}: {}", config.cidr, e)))?;
    let cidr = Ipv4Network::new(cidr.network(), cidr.prefix())
        .map_err(|e| StackError::network_layout(e.to_string()))?;
    if !VPC_PREFIX_RANGE.contains(&cidr.prefix()) {
        return Err(StackError::network_layout(format!(
            "VPC CIDR {} must have a prefix between /{} and /{}",
            cidr,
            VPC_PREFIX_RANGE.start(),
            VPC_PREFIX_RANGE.end()
        )));
    }

    let az_count = usize::from(config.max_azs);
    if az_count == 0 {
        return Err(StackError::network_layout("at least one availability zone is required"));
    }
    let nat_count = usize::from(config.nat_gateways).min(az_count);

    info!(
        cidr = %cidr,
        azs = az_count,
        nat_gateways = nat_count,
        "Building VPC"
    );

    let blocks = carve_subnets(cidr, az_count * 2)?;

    let vpc = stack.add(
        "VPC",
        Resource::new("AWS::EC2::VPC").properties(props! {
            "CidrBlock" => cidr.to_string(),
            "EnableDnsHostnames" => true,
            "EnableDnsSupport" => true,
            "InstanceTenancy" => "default",
            "Tags" => stack.name_tags("VPC"),
        }),
    )?;

    let igw = stack.add(
        "VPC/IGW",
        Resource::new("AWS::EC2::InternetGateway")
            .property("Tags", stack.name_tags("VPC")),
    )?;
    let gateway_attachment = stack.add(
        "VPC/VPCGW",
        Resource::new("AWS::EC2::VPCGatewayAttachment").properties(props! {
            "VpcId" => vpc.reference(),
            "InternetGatewayId" => igw.reference(),
        }),
    )?;

    let mut public_subnets = Vec::with_capacity(az_count);
    let mut nat_gateways = Vec::with_capacity(nat_count);
    for az in 0..az_count {
        let subnet = add_subnet(stack, &vpc, SubnetKind::Public, az, blocks[az])?;
        let route = stack.add(
            &format!("VPC/PublicSubnet{}/DefaultRoute", az + 1),
            Resource::new("AWS::EC2::Route")
                .properties(props! {
                    "RouteTableId" => subnet.route_table.reference(),
                    "DestinationCidrBlock" => ANYWHERE,
                    "GatewayId" => igw.reference(),
                })
                .depends_on(&gateway_attachment),
        )?;

        if az < nat_count {
            let eip = stack.add(
                &format!("VPC/PublicSubnet{}/EIP", az + 1),
                Resource::new("AWS::EC2::EIP").properties(props! {
                    "Domain" => "vpc",
                    "Tags" => stack.name_tags(&format!("VPC/PublicSubnet{}", az + 1)),
                }),
            )?;
            let nat = stack.add(
                &format!("VPC/PublicSubnet{}/NATGateway", az + 1),
                Resource::new("AWS::EC2::NatGateway")
                    .properties(props! {
                        "SubnetId" => subnet.subnet_id(),
                        "AllocationId" => eip.get_att("AllocationId"),
                        "Tags" => stack.name_tags(&format!("VPC/PublicSubnet{}", az + 1)),
                    })
                    .depends_on(&route),
            )?;
            nat_gateways.push(nat);
        }
        public_subnets.push(subnet);
    }

    let mut private_subnets = Vec::with_capacity(az_count);
    for az in 0..az_count {
        let subnet = add_subnet(stack, &vpc, SubnetKind::Private, az, blocks[az_count + az])?;
        if !nat_gateways.is_empty() {
            let nat = &nat_gateways[az % nat_gateways.len()];
            stack.add(
                &format!("VPC/PrivateSubnet{}/DefaultRoute", az + 1),
                Resource::new("AWS::EC2::Route").properties(props! {
                    "RouteTableId" => subnet.route_table.reference(),
                    "DestinationCidrBlock" => ANYWHERE,
                    "NatGatewayId" => nat.reference(),
                }),
            )?;
        }
        private_subnets.push(subnet);
    }

    Ok(Network {
        vpc,
        cidr,
        internet_gateway: igw,
        public_subnets,
        private_subnets,
        nat_gateways,
    })
}

fn add_subnet(
    stack: &mut Stack,
    vpc: &LogicalId,
    kind: SubnetKind,
    az: usize,
    cidr: Ipv4Network,
) -> Result<Subnet> {
    let base = format!("VPC/{}Subnet{}", kind.label(), az + 1);
    let availability_zone = Value::availability_zone(az as u32);

    let mut tags = stack.name_tags(&base);
    if let Value::List(items) = &mut tags {
        items.push(Value::from(props! {
            "Key" => "gluecat:subnet-type",
            "Value" => kind.label(),
        }));
    }

    let id = stack.add(
        &format!("{}/Subnet", base),
        Resource::new("AWS::EC2::Subnet").properties(props! {
            "VpcId" => vpc.reference(),
            "AvailabilityZone" => availability_zone.clone(),
            "CidrBlock" => cidr.to_string(),
            "MapPublicIpOnLaunch" => kind == SubnetKind::Public,
            "Tags" => tags,
        }),
    )?;
    let route_table = stack.add(
        &format!("{}/RouteTable", base),
        Resource::new("AWS::EC2::RouteTable").properties(props! {
            "VpcId" => vpc.reference(),
            "Tags" => stack.name_tags(&base),
        }),
    )?;
    stack.add(
        &format!("{}/RouteTableAssociation", base),
        Resource::new("AWS::EC2::SubnetRouteTableAssociation").properties(props! {
            "RouteTableId" => route_table.reference(),
            "SubnetId" => id.reference(),
        }),
    )?;

    Ok(Subnet {
        id,
        route_table,
        kind,
        availability_zone,
        cidr,
    })
}

/// Protocol and port span of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub protocol: &'static str,
    pub from: Option<u16>,
    pub to: Option<u16>,
}

impl PortRange {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "tcp",
            from: Some(port),
            to: Some(port),
        }
    }

    pub fn all_tcp() -> Self {
        Self {
            protocol: "tcp",
            from: Some(0),
            to: Some(65535),
        }
    }

    pub fn all_traffic() -> Self {
        Self {
            protocol: "-1",
            from: None,
            to: None,
        }
    }

    fn apply(&self, rule: &mut crate::intrinsic::Properties) {
        rule.insert("IpProtocol".to_string(), Value::str(self.protocol));
        if let Some(from) = self.from {
            rule.insert("FromPort".to_string(), Value::from(from));
        }
        if let Some(to) = self.to {
            rule.insert("ToPort".to_string(), Value::from(to));
        }
    }
}

/// Inline rule admitting `ports` from any IPv4 address
pub fn rule_from_anywhere(ports: PortRange, description: &str) -> Value {
    let mut rule = props! {
        "CidrIp" => ANYWHERE,
        "Description" => description,
    };
    ports.apply(&mut rule);
    Value::from(rule)
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub id: LogicalId,
}

impl SecurityGroup {
    pub fn group_id(&self) -> Value {
        self.id.get_att("GroupId")
    }
}

/// Security group in the VPC with all outbound traffic allowed.
pub fn build_security_group(
    stack: &mut Stack,
    network: &Network,
    construct_id: &str,
    description: &str,
    ingress: Vec<Value>,
) -> Result<SecurityGroup> {
    let mut properties = props! {
        "GroupDescription" => description,
        "VpcId" => network.vpc_id(),
        "SecurityGroupEgress" => vec![rule_from_anywhere(
            PortRange::all_traffic(),
            "Allow all outbound traffic by default",
        )],
    };
    if !ingress.is_empty() {
        properties.insert("SecurityGroupIngress".to_string(), Value::List(ingress));
    }
    let id = stack.add(
        construct_id,
        Resource::new("AWS::EC2::SecurityGroup").properties(properties),
    )?;
    Ok(SecurityGroup { id })
}

/// Standalone ingress rule admitting traffic from another security group.
///
/// Kept out of the group's inline rules so self-references and mutual
/// references do not form a dependency cycle.
pub fn allow_ingress(
    stack: &mut Stack,
    construct_id: &str,
    target: &SecurityGroup,
    source: &SecurityGroup,
    ports: PortRange,
    description: &str,
) -> Result<LogicalId> {
    let mut properties = props! {
        "GroupId" => target.group_id(),
        "SourceSecurityGroupId" => source.group_id(),
        "Description" => description,
    };
    ports.apply(&mut properties);
    stack.add(
        construct_id,
        Resource::new("AWS::EC2::SecurityGroupIngress").properties(properties),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_default_layout_into_quarter_blocks() {
        let cidr: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        let blocks = carve_subnets(cidr, 4).unwrap();
        let blocks: Vec<String> = blocks.iter().map(ToString::to_string).collect();
        assert_eq!(
            blocks,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
    }

    #[test]
    fn rounds_subnet_count_up_to_power_of_two() {
        let cidr: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        let blocks = carve_subnets(cidr, 6).unwrap();
        assert_eq!(blocks.len(), 6);
        assert!(blocks.iter().all(|b| b.prefix() == 19));
    }

    #[test]
    fn rejects_cidr_too_small() {
        let cidr: Ipv4Network = "10.0.0.0/27".parse().unwrap();
        let err = carve_subnets(cidr, 4).unwrap_err();
        assert_eq!(err.code().as_str(), "E006");
    }

    #[test]
    fn rejects_vpc_outside_allowed_prefixes() {
        for cidr in ["10.0.0.0/8", "10.0.0.0/30"] {
            let mut stack = Stack::new("Test");
            let config = NetworkConfig {
                cidr: cidr.to_string(),
                ..NetworkConfig::default()
            };
            let err = build_vpc(&mut stack, &config).unwrap_err();
            assert_eq!(err.code().as_str(), "E006", "{}", cidr);
        }
    }

    #[test]
    fn builds_public_and_private_tiers() {
        let mut stack = Stack::new("Test");
        let network = build_vpc(&mut stack, &NetworkConfig::default()).unwrap();

        assert_eq!(network.public_subnets.len(), 2);
        assert_eq!(network.private_subnets.len(), 2);
        assert_eq!(network.nat_gateways.len(), 2);
        assert_eq!(network.vpc.as_str(), "VPC");
        assert_eq!(
            network.first_private_subnet().id.as_str(),
            "VPCPrivateSubnet1Subnet"
        );
        assert_eq!(
            network.first_private_subnet().availability_zone,
            Value::availability_zone(0)
        );

        let template = stack.synth().unwrap();
        assert_eq!(template.resources_of_type("AWS::EC2::Subnet").count(), 4);
        assert_eq!(template.resources_of_type("AWS::EC2::NatGateway").count(), 2);
        assert_eq!(template.resources_of_type("AWS::EC2::Route").count(), 4);
    }

    #[test]
    fn private_subnets_share_nat_gateways() {
        let mut stack = Stack::new("Test");
        let config = NetworkConfig {
            max_azs: 3,
            nat_gateways: 1,
            ..NetworkConfig::default()
        };
        let network = build_vpc(&mut stack, &config).unwrap();
        assert_eq!(network.nat_gateways.len(), 1);

        let template = stack.synth().unwrap();
        for az in 1..=3 {
            let route = template
                .resource(&format!("VPCPrivateSubnet{}DefaultRoute", az))
                .unwrap();
            assert_eq!(
                route.prop("NatGatewayId"),
                Some(&Value::reference("VPCPublicSubnet1NATGateway"))
            );
        }
    }

    #[test]
    fn no_nat_gateways_means_isolated_private_subnets() {
        let mut stack = Stack::new("Test");
        let config = NetworkConfig {
            nat_gateways: 0,
            ..NetworkConfig::default()
        };
        build_vpc(&mut stack, &config).unwrap();
        let template = stack.synth().unwrap();
        assert!(template.resource("VPCPrivateSubnet1DefaultRoute").is_none());
        assert_eq!(template.resources_of_type("AWS::EC2::EIP").count(), 0);
    }
}
