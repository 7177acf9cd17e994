//! JavaScript evaluated in the portal page by the Chromium driver.
//!
//! Every script is the shared [`PRELUDE`] followed by a body that may use the
//! `rdv` helper object. Elements handed back to Rust are tagged with a
//! `data-randevu-ref` attribute so later calls can find them again, including
//! inside Vaadin shadow roots.

use serde::Serialize;

use super::Strategy;

const PRELUDE: &str = r#"
const rdv = (() => {
	const all = () => {
		const out = [];
		const walk = (root) => {
			for (const el of root.querySelectorAll('*')) {
				out.push(el);
				if (el.shadowRoot) walk(el.shadowRoot);
			}
		};
		walk(document);
		return out;
	};
	const visible = (el) => {
		const r = el.getBoundingClientRect();
		if (r.width === 0 || r.height === 0) return false;
		const s = getComputedStyle(el);
		return s.visibility !== 'hidden' && s.display !== 'none';
	};
	const re = (p) => new RegExp(p, 'iu');
	const own = (el) => (el.innerText || el.textContent || '').trim();
	const labelOf = (el) => {
		const parts = [el.getAttribute('aria-label'), el.label, el.getAttribute('label')];
		const by = el.getAttribute('aria-labelledby');
		if (by) for (const id of by.split(/\s+/)) { const l = document.getElementById(id); if (l) parts.push(own(l)); }
		if (el.id) for (const l of document.querySelectorAll('label[for="' + CSS.escape(el.id) + '"]')) parts.push(own(l));
		const wrap = el.closest && el.closest('label');
		if (wrap) parts.push(own(wrap));
		return parts.filter((p) => typeof p === 'string' && p.trim()).join(' ').trim();
	};
	const roleOf = (el) => {
		const explicit = el.getAttribute('role');
		if (explicit) return explicit;
		const tag = el.tagName.toLowerCase();
		if (tag === 'button' || tag === 'vaadin-button') return 'button';
		if (tag === 'input' && /^(submit|button)$/i.test(el.type)) return 'button';
		if (tag === 'a' && el.hasAttribute('href')) return 'link';
		if (tag === 'select' || tag === 'vaadin-combo-box' || tag === 'vaadin-select') return 'combobox';
		if (tag === 'vaadin-checkbox' || (tag === 'input' && el.type === 'checkbox')) return 'checkbox';
		return '';
	};
	const nameOf = (el) => own(el) || labelOf(el) || (el.value || '').toString().trim();
	const inner = (el) => el.inputElement || el.focusElement || (el.shadowRoot && el.shadowRoot.querySelector('input')) || el.querySelector('input') || el;
	const tag = (el) => {
		let id = el.getAttribute('data-randevu-ref');
		if (!id) {
			window.__rdvSeq = (window.__rdvSeq || 0) + 1;
			id = 'r' + window.__rdvSeq;
			el.setAttribute('data-randevu-ref', id);
		}
		return id;
	};
	const byRef = (id) => {
		const el = all().find((e) => e.getAttribute('data-randevu-ref') === id);
		if (!el) throw new Error('element ' + id + ' is detached');
		return el;
	};
	const months = { oca: '01', 'şub': '02', sub: '02', mar: '03', nis: '04', may: '05', haz: '06', tem: '07', 'ağu': '08', agu: '08', eyl: '09', eki: '10', kas: '11', ara: '12' };
	const parseTrDate = (text) => {
		const m = text.trim().match(/(\d{1,2})\s+([a-zçğıöşüA-ZÇĞİÖŞÜ]+)/i);
		if (!m) return '';
		const mon = months[m[2].substring(0, 3).toLowerCase()];
		return mon ? m[1].padStart(2, '0') + '.' + mon + '.' + new Date().getFullYear() : '';
	};
	const cue = (el, bg) => {
		const cls = (typeof el.className === 'string' ? el.className : '').toLowerCase();
		if (/green|available|acik|açık|success|musait/.test(cls)) return 'açık';
		if (/red|full|dolu|danger|occupied/.test(cls)) return 'dolu';
		if (/gr[ae]y|closed|kapal|disabled/.test(cls)) return 'kapalı';
		if (/blue|purple|capacity|kapasite/.test(cls)) return 'web_kapasite_dolu';
		if (/teal|cyan|acilacak/.test(cls)) return 'açılacak';
		const m = bg.match(/rgba?\((\d+),\s*(\d+),\s*(\d+)/);
		if (!m) return 'bilinmiyor';
		const [r, g, b] = [parseInt(m[1]), parseInt(m[2]), parseInt(m[3])];
		const max = Math.max(r, g, b), min = Math.min(r, g, b);
		if (min > 230) return 'bos';
		if (max - min < 30 && max < 200 && max > 50) return 'kapalı';
		if (g > r + 30 && g > b + 30) return 'açık';
		if (r > g + 30 && r > b + 30) return 'dolu';
		if (b > r + 20 && b > g + 20) return 'web_kapasite_dolu';
		if (g > r + 20 && b > r + 20 && Math.abs(g - b) < 60) return 'açılacak';
		return 'bilinmiyor';
	};
	const cells = () => {
		const els = all();
		const headers = [];
		for (const el of els) {
			const t = (el.textContent || '').trim();
			if (t.length < 30 && /^\s*\d{1,2}\s+[A-Za-zçğıöşüÇĞİÖŞÜ]+\s*$/.test(t) && visible(el)) {
				const date = parseTrDate(t);
				if (date) { const r = el.getBoundingClientRect(); headers.push({ date, x: r.left + r.width / 2 }); }
			}
		}
		const seen = new Set();
		const out = [];
		for (const el of els) {
			const raw = el.textContent || '';
			if (raw.length > 40) continue;
			const tm = raw.trim().match(/(\d{1,2})[:.](\d{2})/);
			if (!tm || !visible(el)) continue;
			const r = el.getBoundingClientRect();
			const key = Math.round(r.left) + ',' + Math.round(r.top);
			if (seen.has(key)) continue;
			seen.add(key);
			let bg = '', probe = el;
			for (let depth = 0; depth < 6 && probe; depth++) {
				bg = getComputedStyle(probe).backgroundColor;
				if (bg && bg !== 'rgba(0, 0, 0, 0)' && bg !== 'transparent') break;
				probe = probe.parentElement || (probe.getRootNode && probe.getRootNode().host);
			}
			const state = cue(el, bg || '');
			if (state === 'bos') continue;
			let date = '', best = Infinity;
			const cx = r.left + r.width / 2;
			for (const h of headers) { const d = Math.abs(cx - h.x); if (d < best) { best = d; date = h.date; } }
			out.push({ el, date, time: tm[1].padStart(2, '0') + ':' + tm[2], cue: state });
		}
		return out;
	};
	const match = (s) => {
		const els = all().filter(visible);
		switch (s.kind) {
			case 'label': { const p = re(s.pattern); return els.filter((el) => { const l = labelOf(el); return l && p.test(l); }); }
			case 'role': { const p = re(s.name); return els.filter((el) => roleOf(el) === s.role && p.test(nameOf(el))); }
			case 'attribute': {
				const needle = s.needle.toLowerCase();
				return els.filter((el) => (s.tag === '*' || el.tagName.toLowerCase() === s.tag)
					&& s.attributes.some((a) => (el.getAttribute(a) || '').toLowerCase().includes(needle)));
			}
			case 'text': {
				const p = re(s.pattern);
				const scopes = s.scope === 'body' ? [document.body] : all().filter((el) => el.matches(s.scope));
				const hits = els.filter((el) => scopes.some((sc) => sc === el || sc.contains(el) || (sc.shadowRoot && sc.shadowRoot.contains(el)))
					&& p.test(own(el)));
				return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
			}
			case 'css': return els.filter((el) => el.matches(s.selector));
			case 'grid_cell': return cells().filter((c) => c.date === s.date && c.time === s.time).map((c) => c.el);
		}
		return [];
	};
	return { all, visible, labelOf, inner, tag, byRef, cells, match, own };
})();
"#;

fn script(body: &str) -> String {
	format!("(async () => {{{PRELUDE}\n{body}\n}})()")
}

fn arg<T: Serialize + ?Sized>(value: &T) -> String {
	serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

pub(super) fn query_all(strategy: &Strategy) -> String {
	script(&format!("return rdv.match({}).map(rdv.tag);", arg(strategy)))
}

pub(super) fn click(element: &str) -> String {
	script(&format!(
		"const el = rdv.byRef({}); el.scrollIntoView({{block: 'center'}}); \
		 for (const t of ['pointerdown', 'mousedown', 'pointerup', 'mouseup']) el.dispatchEvent(new MouseEvent(t, {{bubbles: true, composed: true}})); \
		 el.click(); return true;",
		arg(element)
	))
}

pub(super) fn fill(element: &str, value: &str) -> String {
	script(&format!(
		"const host = rdv.byRef({el}); const input = rdv.inner(host); input.focus(); \
		 const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(input), 'value'); \
		 if (setter && setter.set) setter.set.call(input, {v}); else input.value = {v}; \
		 if (host !== input && 'value' in host) host.value = {v}; \
		 for (const t of ['input', 'change']) input.dispatchEvent(new Event(t, {{bubbles: true, composed: true}})); \
		 input.blur(); return true;",
		el = arg(element),
		v = arg(value)
	))
}

pub(super) fn press_enter(element: &str) -> String {
	script(&format!(
		"const input = rdv.inner(rdv.byRef({})); input.focus(); \
		 for (const t of ['keydown', 'keypress', 'keyup']) input.dispatchEvent(new KeyboardEvent(t, {{key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true, composed: true}})); \
		 return true;",
		arg(element)
	))
}

pub(super) fn is_checked(element: &str) -> String {
	script(&format!(
		"const el = rdv.byRef({}); const input = rdv.inner(el); \
		 return !!(el.checked || input.checked || el.getAttribute('aria-checked') === 'true' || el.hasAttribute('checked'));",
		arg(element)
	))
}

pub(super) fn input_value(element: &str) -> String {
	script(&format!(
		"const el = rdv.byRef({}); const input = rdv.inner(el); \
		 return ((input && input.value) || el.value || '').toString().trim();",
		arg(element)
	))
}

pub(super) fn text(element: &str) -> String {
	script(&format!("return rdv.own(rdv.byRef({}));", arg(element)))
}

const COMBO_HELPERS: &str = r#"
const labelFor = (combo, item) => {
	if (item === null || item === undefined) return '';
	if (typeof item !== 'object') return String(item);
	const path = combo.itemLabelPath || 'label';
	return String(item[path] ?? item.label ?? item.text ?? '');
};
const overlayItems = async (combo) => {
	combo.opened = true;
	await new Promise((r) => setTimeout(r, 300));
	const items = rdv.all().filter((el) => el.matches('vaadin-combo-box-item, vaadin-combo-box-overlay [role="option"]') && rdv.visible(el));
	return items;
};
"#;

pub(super) fn combo_items(element: &str) -> String {
	script(&format!(
		"{COMBO_HELPERS}\nconst combo = rdv.byRef({}); \
		 if (combo.tagName.toLowerCase() === 'select') return [...combo.options].map((o) => o.textContent.trim()); \
		 if (Array.isArray(combo.items) && combo.items.length) return combo.items.map((i) => labelFor(combo, i).trim()); \
		 if (Array.isArray(combo.filteredItems) && combo.filteredItems.length) return combo.filteredItems.map((i) => labelFor(combo, i).trim()); \
		 const texts = (await overlayItems(combo)).map((el) => rdv.own(el)); combo.opened = false; return texts;",
		arg(element)
	))
}

pub(super) fn choose_combo_item(element: &str, item: &str) -> String {
	script(&format!(
		"{COMBO_HELPERS}\nconst combo = rdv.byRef({el}); const want = {item}.trim().toLowerCase(); \
		 if (combo.tagName.toLowerCase() === 'select') {{ \
		   const opt = [...combo.options].find((o) => o.textContent.trim().toLowerCase() === want); \
		   if (!opt) return false; combo.value = opt.value; combo.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }} \
		 const source = Array.isArray(combo.items) && combo.items.length ? combo.items : combo.filteredItems; \
		 if (Array.isArray(source) && source.length) {{ \
		   const hit = source.find((i) => labelFor(combo, i).trim().toLowerCase() === want); \
		   if (hit === undefined) return false; \
		   combo.selectedItem = hit; \
		   combo.dispatchEvent(new CustomEvent('selected-item-changed', {{detail: {{value: hit}}, bubbles: true, composed: true}})); \
		   combo.dispatchEvent(new Event('change', {{bubbles: true, composed: true}})); combo.opened = false; return true; }} \
		 const hit = (await overlayItems(combo)).find((el) => rdv.own(el).toLowerCase() === want); \
		 if (!hit) {{ combo.opened = false; return false; }} \
		 hit.click(); return true;",
		el = arg(element),
		item = arg(item)
	))
}

pub(super) const DISMISS: &str = r#"(async () => {
	const target = document.activeElement || document.body;
	for (const t of ['keydown', 'keyup']) target.dispatchEvent(new KeyboardEvent(t, { key: 'Escape', code: 'Escape', keyCode: 27, bubbles: true, composed: true }));
	return true;
})()"#;

pub(super) fn captcha() -> String {
	script(
		"const frame = rdv.all().find((el) => el.matches('iframe[title*=\"reCAPTCHA\" i], iframe[src*=\"recaptcha\" i]') && rdv.visible(el)); \
		 if (!frame) return 'absent'; \
		 const answer = document.querySelector('textarea[name=\"g-recaptcha-response\"]'); \
		 return answer && answer.value && answer.value.length > 0 ? 'solved' : 'pending';",
	)
}

pub(super) fn grid_cells() -> String {
	script("return rdv.cells().map((c) => ({ date: c.date, time: c.time, cue: c.cue }));")
}

pub(super) fn body_text() -> String {
	script("return (document.body && document.body.innerText) || '';")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arguments_are_embedded_as_json_literals() {
		let js = fill("r1", "05.03.'1990\"");
		assert!(js.contains(r#""05.03.'1990\"""#));
		assert!(js.starts_with("(async () => {"));
		assert!(js.trim_end().ends_with("})()"));
	}

	#[test]
	fn strategies_are_passed_with_their_kind_tag() {
		let js = query_all(&Strategy::grid_cell("26.02.2026", "16:00"));
		assert!(js.contains(r#"{"kind":"grid_cell","date":"26.02.2026","time":"16:00"}"#));
	}
}
