mod cidr;

pub use cidr::IpCidr;
