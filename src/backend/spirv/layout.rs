//! std140 layout rules for uniform blocks

use crate::ast::{ExpressionType, PrimitiveType};
use crate::sanitizer::SanitizedModule;

/// Size and base alignment of a type, in bytes
pub fn size_align(ty: &ExpressionType, module: &SanitizedModule) -> (u32, u32) {
    match ty {
        ExpressionType::Primitive(_) => (4, 4),
        ExpressionType::Vector { size, .. } => {
            let size = u32::from(*size);
            let align = if size == 2 { 8 } else { 16 };
            (4 * size, align)
        }
        ExpressionType::Struct(name) | ExpressionType::Uniform(name) => {
            let offsets = member_offsets(name, module);
            let info = module.struct_info(name);
            let mut align = 16;
            let mut end = 0;
            if let Some(info) = info {
                for ((_, field_ty), offset) in info.fields.iter().zip(&offsets) {
                    let (size, field_align) = size_align(field_ty, module);
                    align = align.max(field_align);
                    end = offset + size;
                }
            }
            (round_up(end, align), align)
        }
        ExpressionType::Void => (0, 1),
    }
}

/// Offset of every member of `name`, in declaration order
pub fn member_offsets(name: &str, module: &SanitizedModule) -> Vec<u32> {
    let Some(info) = module.struct_info(name) else {
        return Vec::new();
    };
    let mut offsets = Vec::with_capacity(info.fields.len());
    let mut offset = 0;
    for (_, ty) in &info.fields {
        let (size, align) = size_align(ty, module);
        offset = round_up(offset, align);
        offsets.push(offset);
        offset += size;
    }
    offsets
}

/// First `bool` member reachable from `name`, as a dotted path
pub fn find_bool_member(name: &str, module: &SanitizedModule) -> Option<String> {
    let info = module.struct_info(name)?;
    info.fields.iter().find_map(|(field, ty)| match ty {
        ExpressionType::Primitive(PrimitiveType::Bool)
        | ExpressionType::Vector {
            component: PrimitiveType::Bool,
            ..
        } => Some(field.clone()),
        ExpressionType::Struct(inner) => {
            find_bool_member(inner, module).map(|path| format!("{}.{}", field, path))
        }
        _ => None,
    })
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}
