use ring::digest;

/// 对多个字段做 SHA256，每个字段前加长度前缀，避免 ("ab", "c") 与 ("a", "bc") 撞到同一个值
pub fn digest_fields(fields: &[&[u8]]) -> String {
    let mut ctx = digest::Context::new(&digest::SHA256);
    for field in fields {
        ctx.update(&(field.len() as u64).to_be_bytes());
        ctx.update(field);
    }
    hex::encode(ctx.finish().as_ref())
}

pub fn digest_str(value: &str) -> String {
    let hash = digest::digest(&digest::SHA256, value.as_bytes());
    hex::encode(hash.as_ref())
}
