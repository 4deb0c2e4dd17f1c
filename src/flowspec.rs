use super::action::Action;
use super::ethernet;
use super::flow::SwFlowKey;
use super::ipv4;
use super::openflow as ofp;
use super::openflow::OfpMatch;

use regex::Regex;
use once_cell::sync::Lazy;

// FLOW SPECIFICATIONS
//
// Text syntax for flows: "field=value,...,actions=act[,act]*". A field value
// of "*" or "ANY" wildcards the field, as does leaving it out. IPv4 addresses
// take an optional /prefix. Used for the static flows in the daemon's
// configuration file and handy in tests.
//
//   parse("in_port=1,dl_type=0x0800,actions=output:2") -> FlowSpec

pub struct FlowSpec {
    pub key: SwFlowKey,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub actions: Vec<Action>
}

static FIELD_SYNTAX: Lazy<Regex> = Lazy::new
    (|| Regex::new(r"^([\w_]+)=([^=]*)$").unwrap());

fn number(s: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|_| format!("bad number: {}", s))
}

fn number_u16(s: &str) -> Result<u16, String> {
    let n = number(s)?;
    if n > u16::MAX as u64 {
        return Err(format!("number out of range: {}", s));
    }
    Ok(n as u16)
}

fn mac(s: &str) -> Result<ethernet::MacAddress, String> {
    ethernet::pton(s).ok_or_else(|| format!("bad MAC address: {}", s))
}

// "a.b.c.d" or "a.b.c.d/n"; returns the address (host byte order, as the
// wire match carries it) and the number of wildcarded low bits.
fn ip_and_wild(s: &str) -> Result<(u32, u32), String> {
    let (addr, wild) = match s.split_once('/') {
        Some((addr, prefix)) => {
            let n = number(prefix)?;
            if n > 32 {
                return Err(format!("bad prefix length: {}", s));
            }
            (addr, 32 - n as u32)
        }
        None => (s, 0)
    };
    let a = ipv4::pton(addr).ok_or_else(|| format!("bad address: {}", s))?;
    Ok((super::lib::ntohl(a), wild))
}

fn is_any(s: &str) -> bool {
    s == "*" || s.eq_ignore_ascii_case("any")
}

fn parse_action(s: &str) -> Result<Action, String> {
    let (name, arg) = match s.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (s, None)
    };
    let need = |what: &str| arg.ok_or(format!("{} needs an argument", what));
    match name {
        "output" => Ok(Action::Output {
            port: number_u16(need("output")?)?, max_len: 0
        }),
        "flood" => Ok(Action::Output { port: ofp::OFPP_FLOOD, max_len: 0 }),
        "all" => Ok(Action::Output { port: ofp::OFPP_ALL, max_len: 0 }),
        "local" => Ok(Action::Output { port: ofp::OFPP_LOCAL, max_len: 0 }),
        "normal" => Ok(Action::Output { port: ofp::OFPP_NORMAL, max_len: 0 }),
        "controller" => Ok(Action::Output {
            port: ofp::OFPP_CONTROLLER,
            max_len: match arg { Some(a) => number_u16(a)?, None => 0 }
        }),
        "mod_vlan_vid" => Ok(Action::SetVlanVid(
            number_u16(need("mod_vlan_vid")?)?)),
        "mod_vlan_pcp" => {
            let pcp = number_u16(need("mod_vlan_pcp")?)?;
            if pcp > 7 {
                return Err(format!("bad VLAN priority: {}", s));
            }
            Ok(Action::SetVlanPcp(pcp as u8))
        }
        "strip_vlan" => Ok(Action::StripVlan),
        "mod_dl_src" => Ok(Action::SetDlSrc(mac(need("mod_dl_src")?)?)),
        "mod_dl_dst" => Ok(Action::SetDlDst(mac(need("mod_dl_dst")?)?)),
        "mod_nw_src" => Ok(Action::SetNwSrc(
            ip_and_wild(need("mod_nw_src")?)?.0)),
        "mod_nw_dst" => Ok(Action::SetNwDst(
            ip_and_wild(need("mod_nw_dst")?)?.0)),
        "mod_tp_src" => Ok(Action::SetTpSrc(number_u16(need("mod_tp_src")?)?)),
        "mod_tp_dst" => Ok(Action::SetTpDst(number_u16(need("mod_tp_dst")?)?)),
        _ => Err(format!("unknown action: {}", s))
    }
}

pub fn parse(spec: &str) -> Result<FlowSpec, String> {
    let (fields, actions) = match spec.split_once("actions=") {
        Some((fields, actions)) => (fields.trim_end_matches(','), actions),
        None => return Err("flow needs an actions= part".to_string())
    };

    let mut actions_list = Vec::new();
    for a in actions.split(',').filter(|a| !a.is_empty()) {
        actions_list.push(parse_action(a.trim())?);
    }
    if actions_list.is_empty() {
        return Err("flow needs at least one action".to_string());
    }

    let mut m = OfpMatch::default();
    m.wildcards = ofp::OFPFW_ALL;
    let mut priority = 0u16;
    let mut idle_timeout = 0u16;
    let mut hard_timeout = 0u16;

    for token in fields.split(',').filter(|t| !t.is_empty()) {
        let cap = FIELD_SYNTAX.captures(token.trim())
            .ok_or_else(|| format!("bad field syntax: {}", token))?;
        let (field, value) = (&cap[1], cap[2].trim());
        if is_any(value) {
            continue; // wildcarded by default
        }
        match field {
            "in_port" => {
                m.in_port = number_u16(value)?;
                m.wildcards &= !ofp::OFPFW_IN_PORT;
            }
            "dl_vlan" => {
                m.dl_vlan = number_u16(value)?;
                m.wildcards &= !ofp::OFPFW_DL_VLAN;
            }
            "dl_src" => {
                m.dl_src = mac(value)?;
                m.wildcards &= !ofp::OFPFW_DL_SRC;
            }
            "dl_dst" => {
                m.dl_dst = mac(value)?;
                m.wildcards &= !ofp::OFPFW_DL_DST;
            }
            "dl_type" => {
                m.dl_type = number_u16(value)?;
                m.wildcards &= !ofp::OFPFW_DL_TYPE;
            }
            "nw_src" => {
                let (addr, wild) = ip_and_wild(value)?;
                m.nw_src = addr;
                m.wildcards &= !ofp::OFPFW_NW_SRC_MASK;
                m.wildcards |= wild << ofp::OFPFW_NW_SRC_SHIFT;
            }
            "nw_dst" => {
                let (addr, wild) = ip_and_wild(value)?;
                m.nw_dst = addr;
                m.wildcards &= !ofp::OFPFW_NW_DST_MASK;
                m.wildcards |= wild << ofp::OFPFW_NW_DST_SHIFT;
            }
            "nw_proto" => {
                let n = number(value)?;
                if n > u8::MAX as u64 {
                    return Err(format!("bad protocol: {}", value));
                }
                m.nw_proto = n as u8;
                m.wildcards &= !ofp::OFPFW_NW_PROTO;
            }
            "tp_src" => {
                m.tp_src = number_u16(value)?;
                m.wildcards &= !ofp::OFPFW_TP_SRC;
            }
            "tp_dst" => {
                m.tp_dst = number_u16(value)?;
                m.wildcards &= !ofp::OFPFW_TP_DST;
            }
            "priority" => priority = number_u16(value)?,
            "idle_timeout" => idle_timeout = number_u16(value)?,
            "hard_timeout" => hard_timeout = number_u16(value)?,
            _ => return Err(format!("unknown field: {}", field))
        }
    }

    Ok(FlowSpec {
        key: SwFlowKey::from_match(&m),
        priority,
        idle_timeout,
        hard_timeout,
        actions: actions_list
    })
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::lib;

    #[test]
    fn full_spec() {
        let f = parse("in_port=1,dl_type=0x0800,nw_proto=6,\
                       nw_dst=10.0.0.0/24,tp_dst=80,priority=100,\
                       idle_timeout=60,actions=mod_nw_dst:10.0.0.1,output:2")
            .unwrap();
        assert_eq!(f.priority, 100);
        assert_eq!(f.idle_timeout, 60);
        assert_eq!(f.hard_timeout, 0);
        assert_eq!(f.key.flow.in_port, lib::htons(1));
        assert_eq!(f.key.flow.dl_type, lib::htons(0x0800));
        assert_eq!(f.key.flow.nw_proto, 6);
        assert_eq!(f.key.flow.tp_dst, lib::htons(80));
        // /24 leaves 8 low bits wild.
        assert_eq!(f.key.nw_dst_mask, lib::htonl(0xffffff00));
        assert_eq!(f.actions,
                   vec![Action::SetNwDst(u32::from_be_bytes([10, 0, 0, 1])),
                        Action::Output { port: 2, max_len: 0 }]);
    }

    #[test]
    fn wildcards_by_default_and_by_star() {
        let f = parse("dl_type=0x0806,nw_src=*,actions=flood").unwrap();
        assert_eq!(f.key.flow.dl_type, lib::htons(0x0806));
        assert_ne!(f.key.wildcards & ofp::OFPFW_IN_PORT, 0);
        assert_eq!(f.actions,
                   vec![Action::Output { port: ofp::OFPP_FLOOD, max_len: 0 }]);

        let g = parse("tp_src=ANY,dl_type=0x0800,actions=controller:64")
            .unwrap();
        assert_eq!(g.actions,
                   vec![Action::Output { port: ofp::OFPP_CONTROLLER,
                                         max_len: 64 }]);
    }

    #[test]
    fn exact_spec_has_no_wildcards() {
        let f = parse("in_port=1,dl_vlan=0xffff,\
                       dl_src=52:54:00:01:01:01,dl_dst=52:54:00:02:02:02,\
                       dl_type=0x0800,nw_src=192.168.0.123,nw_dst=10.10.0.42,\
                       nw_proto=6,tp_src=200,tp_dst=80,actions=output:2")
            .unwrap();
        assert_eq!(f.key.wildcards, 0, "fully-specified flow");
    }

    #[test]
    fn rejections() {
        assert!(parse("in_port=1").is_err());
        assert!(parse("in_port=1,actions=").is_err());
        assert!(parse("bogus=1,actions=flood").is_err());
        assert!(parse("in_port=zzz,actions=flood").is_err());
        assert!(parse("actions=warp:9").is_err());
        assert!(parse("nw_src=10.0.0.0/33,actions=flood").is_err());
        assert!(parse("dl_src=52:54,actions=flood").is_err());
        assert!(parse("actions=mod_vlan_pcp:9").is_err());
    }
}
