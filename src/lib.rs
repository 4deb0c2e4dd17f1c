use std::cmp;
use std::time::{Duration, Instant};
use regex::Regex;
use once_cell::sync::Lazy;

pub fn fill(dst: &mut [u8], len: usize, val: u8) {
    let len = cmp::min(len, dst.len());
    for b in &mut dst[..len] { *b = val; }
}

pub fn copy(dst: &mut [u8], src: &[u8], len: usize) {
    let len = cmp::min(len, cmp::min(src.len(), dst.len()));
    dst[..len].copy_from_slice(&src[..len]);
}

#[cfg(target_endian = "little")] pub fn htonl(l: u32) -> u32 { l.swap_bytes() }
#[cfg(target_endian = "little")] pub fn ntohl(l: u32) -> u32 { l.swap_bytes() }
#[cfg(target_endian = "little")] pub fn htons(s: u16) -> u16 { s.swap_bytes() }
#[cfg(target_endian = "little")] pub fn ntohs(s: u16) -> u16 { s.swap_bytes() }
#[cfg(target_endian = "big"   )] pub fn htonl(l: u32) -> u32 { l }
#[cfg(target_endian = "big"   )] pub fn ntohl(l: u32) -> u32 { l }
#[cfg(target_endian = "big"   )] pub fn htons(s: u16) -> u16 { s }
#[cfg(target_endian = "big"   )] pub fn ntohs(s: u16) -> u16 { s }

pub fn comma_value(n: u64) -> String { // credit http://richard.warburton.it
    let s = format!("{}", n);
    if let Some(cap) = CVLEFTNUM.captures(&s) {
        let (left, num) = (&cap[1], &cap[2]);
        let rev = |s: &str| { s.chars().rev().collect::<String>() };
        let num = rev(&CVTHOUSANDS.replace_all(&rev(&num), "$1,").to_string());
        format!("{}{}", left, num)
    } else { s }
}
static CVLEFTNUM: Lazy<Regex> = Lazy::new
    (|| Regex::new(r"^(\d\d?\d?)((?:\d{3})*)$").unwrap());
static CVTHOUSANDS: Lazy<Regex> = Lazy::new
    (|| Regex::new(r"(\d{3})").unwrap());

// Return a throttle function.
//
// The throttle returns true at most once in any <duration> time interval.
// Used to rate limit log records on per-packet error paths.
pub fn throttle(duration: Duration) -> Box<dyn FnMut() -> bool> {
    let mut deadline = Instant::now();
    Box::new(move || if Instant::now() > deadline {
                         deadline = Instant::now() + duration; true }
                     else { false })
}
