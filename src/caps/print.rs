use std::io;

use super::{CapNg, CapType, Select};

impl CapNg {
    /// The capabilities raised in every set named by `types`, as comma-separated registry names
    /// (`"none"` if there are none).
    pub fn caps_text(&self, types: CapType) -> String {
        let set = self.sets.common(types);

        if set.is_empty() {
            return "none".to_string();
        }

        set.iter().map(|cap| cap.name()).collect::<Vec<_>>().join(", ")
    }

    /// The sets covered by `select` as hexadecimal words, one line per set, upper word first:
    ///
    /// ```text
    /// Effective:    00000000, 00003000
    /// ```
    pub fn caps_numeric(&self, select: Select) -> String {
        let mut out = String::new();

        for (t, set) in self.sets.iter_types(select.types()) {
            let label = if t == CapType::EFFECTIVE {
                "Effective:    "
            } else if t == CapType::PERMITTED {
                "Permitted:    "
            } else if t == CapType::INHERITABLE {
                "Inheritable:  "
            } else if t == CapType::BOUNDING_SET {
                "Bounding Set: "
            } else {
                "Ambient:      "
            };
            let (lower, upper) = set.to_bitmasks_u32();
            out.push_str(&format!("{}{:08X}, {:08X}\n", label, upper, lower));
        }

        out
    }

    /// Write [`caps_text()`](#method.caps_text) and a newline to `w` (e.g. `io::stdout()`).
    pub fn write_caps_text<W: io::Write>(&self, mut w: W, types: CapType) -> io::Result<()> {
        writeln!(w, "{}", self.caps_text(types))
    }

    /// Write [`caps_numeric()`](#method.caps_numeric) to `w`.
    pub fn write_caps_numeric<W: io::Write>(&self, mut w: W, select: Select) -> io::Result<()> {
        w.write_all(self.caps_numeric(select).as_bytes())
    }
}
