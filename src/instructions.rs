// The 32-entry opcode table plus the list-handler addressing modes.
// `Opcode` only tags *which* operation a fetched byte selects; the operand
// reads (addr/con/var) happen during `Interpreter::run_one_opcode`, since
// several of them mutate `code_ptr` as a side effect in an order that
// matters (list_handler in particular interleaves a variable write target
// with a list-area offset read).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Goto,
    Gosub,
    Return,
    PrintNumber,
    MessageVar,
    MessageConst,
    Function,
    Input,
    VarCon,
    VarVar,
    Add,
    Sub,
    Jump,
    Exit,
    IfEqVar,
    IfNeVar,
    IfLtVar,
    IfGtVar,
    Screen,
    ClearGraphics,
    Picture,
    GetNextObject,
    IfEqConst,
    IfNeConst,
    IfLtConst,
    IfGtConst,
    PrintInput,
    Illegal(u8),
    /// High bit set: one of the ten list-handler addressing modes.
    ListAccess { raw: u8 },
}

impl Opcode {
    /// Decodes one fetched instruction byte. Does not consume any
    /// further bytes.
    pub fn decode(code: u8) -> Opcode {
        if code & 0x80 != 0 {
            return Opcode::ListAccess { raw: code };
        }
        match code & 0x1f {
            0 => Opcode::Goto,
            1 => Opcode::Gosub,
            2 => Opcode::Return,
            3 => Opcode::PrintNumber,
            4 => Opcode::MessageVar,
            5 => Opcode::MessageConst,
            6 => Opcode::Function,
            7 => Opcode::Input,
            8 => Opcode::VarCon,
            9 => Opcode::VarVar,
            10 => Opcode::Add,
            11 => Opcode::Sub,
            14 => Opcode::Jump,
            15 => Opcode::Exit,
            16 => Opcode::IfEqVar,
            17 => Opcode::IfNeVar,
            18 => Opcode::IfLtVar,
            19 => Opcode::IfGtVar,
            20 => Opcode::Screen,
            21 => Opcode::ClearGraphics,
            22 => Opcode::Picture,
            23 => Opcode::GetNextObject,
            24 => Opcode::IfEqConst,
            25 => Opcode::IfNeConst,
            26 => Opcode::IfLtConst,
            27 => Opcode::IfGtConst,
            28 => Opcode::PrintInput,
            other => Opcode::Illegal(other),
        }
    }
}

/// Sub-dispatch for the `function` opcode, read as the byte
/// immediately following it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    CallDriver,
    Random,
    Save,
    NormalRestore,
    ClearWorkspace,
    ClearStack,
    PrintStringAndAdvance,
    Illegal(u8),
}

impl FunctionCode {
    pub fn decode(byte: u8) -> FunctionCode {
        match byte {
            1 => FunctionCode::CallDriver,
            2 => FunctionCode::Random,
            3 => FunctionCode::Save,
            4 => FunctionCode::NormalRestore,
            5 => FunctionCode::ClearWorkspace,
            6 => FunctionCode::ClearStack,
            250 => FunctionCode::PrintStringAndAdvance,
            other => FunctionCode::Illegal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_bit_always_decodes_as_list_access() {
        assert_eq!(Opcode::decode(0x80), Opcode::ListAccess { raw: 0x80 });
        assert_eq!(Opcode::decode(0xff), Opcode::ListAccess { raw: 0xff });
    }

    #[test]
    fn reserved_low5_codes_are_illegal() {
        assert_eq!(Opcode::decode(12), Opcode::Illegal(12));
        assert_eq!(Opcode::decode(13), Opcode::Illegal(13));
        assert_eq!(Opcode::decode(29), Opcode::Illegal(29));
        assert_eq!(Opcode::decode(30), Opcode::Illegal(30));
        assert_eq!(Opcode::decode(31), Opcode::Illegal(31));
    }

    #[test]
    fn function_sub_codes_decode() {
        assert_eq!(FunctionCode::decode(1), FunctionCode::CallDriver);
        assert_eq!(FunctionCode::decode(250), FunctionCode::PrintStringAndAdvance);
        assert_eq!(FunctionCode::decode(99), FunctionCode::Illegal(99));
    }
}
